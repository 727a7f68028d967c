//! Opaque token storage.
//!
//! Rows hold the SHA-256 digest of a token, never the token itself.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use keygate_auth::types::token::TOKEN_HASH_LEN;
use keygate_auth::types::{TokenRecord, TokenScope};

use crate::{PgPool, StorageError, StorageResult};

type TokenRow = (Vec<u8>, i64, OffsetDateTime, String);

fn record_from_row(row: TokenRow) -> StorageResult<TokenRecord> {
    let (hash, user_id, expiry, scope) = row;
    let hash: [u8; TOKEN_HASH_LEN] = hash.try_into().map_err(|bytes: Vec<u8>| {
        StorageError::invalid_input(format!("token digest has {} bytes", bytes.len()))
    })?;
    let scope = scope
        .parse::<TokenScope>()
        .map_err(StorageError::invalid_input)?;
    Ok(TokenRecord {
        hash,
        user_id,
        expiry,
        scope,
    })
}

/// Token storage operations.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a token record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Integrity` if the user does not exist.
    pub async fn insert(&self, record: &TokenRecord) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.hash[..])
        .bind(record.user_id)
        .bind(record.expiry)
        .bind(record.scope.as_str())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Find a token record by digest, expired or not.
    pub async fn find_by_hash(
        &self,
        hash: &[u8; TOKEN_HASH_LEN],
    ) -> StorageResult<Option<TokenRecord>> {
        let row: Option<TokenRow> = query_as(
            r#"
            SELECT hash, user_id, expiry, scope
            FROM tokens
            WHERE hash = $1
            LIMIT 1
            "#,
        )
        .bind(&hash[..])
        .fetch_optional(self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Delete every token of `scope` owned by `user_id`.
    pub async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> StorageResult<u64> {
        let result = query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope.as_str())
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete tokens whose expiry has passed.
    pub async fn delete_expired(&self) -> StorageResult<u64> {
        let result = query("DELETE FROM tokens WHERE expiry <= NOW()")
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
