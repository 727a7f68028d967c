//! Linked account storage backed by the `accounts` table.

use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use keygate_auth::types::{Account, NewAccount, NewUser, User};

use crate::user::insert_user;
use crate::{PgPool, StorageError, StorageResult};

const ACCOUNT_COLUMNS: &str =
    "id, uuid, user_id, type, provider, provider_account_id, created_at, version";

type AccountRow = (i64, Uuid, i64, String, String, String, OffsetDateTime, i32);

fn account_from_row(row: AccountRow) -> Account {
    let (id, uuid, user_id, account_type, provider, provider_account_id, created_at, version) =
        row;
    Account {
        id,
        uuid,
        user_id,
        account_type,
        provider,
        provider_account_id,
        created_at,
        version,
    }
}

async fn insert_account(
    conn: &mut PgConnection,
    user_id: i64,
    account: &NewAccount,
) -> StorageResult<Account> {
    let sql = format!(
        "INSERT INTO accounts (uuid, user_id, type, provider, provider_account_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {ACCOUNT_COLUMNS}"
    );
    let row: AccountRow = query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&account.account_type)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .fetch_one(conn)
        .await?;
    Ok(account_from_row(row))
}

/// PostgreSQL storage for linked accounts.
pub struct AccountStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountStorage<'a> {
    /// Create a new account storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the account linked for `(provider, provider_account_id)`.
    pub async fn find_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> StorageResult<Option<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE provider = $1 AND provider_account_id = $2"
        );
        let row: Option<AccountRow> = query_as(&sql)
            .bind(provider)
            .bind(provider_account_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(account_from_row))
    }

    /// Link a new account to an existing user.
    ///
    /// A missing user is reported as [`StorageError::Integrity`].
    pub async fn create(&self, user_id: i64, account: &NewAccount) -> StorageResult<Account> {
        let mut conn = self.pool.acquire().await?;
        insert_account(&mut conn, user_id, account).await
    }

    /// Create a user and its first account in one transaction.
    ///
    /// # Errors
    ///
    /// - `StorageError::Conflict` if the email or the provider identity is taken
    /// - `StorageError::Transaction` if any other statement or the commit fails
    pub async fn create_with_user(
        &self,
        user: &NewUser,
        account: &NewAccount,
    ) -> StorageResult<(User, Account)> {
        let mut tx = self.pool.begin().await?;

        let created_user = insert_user(&mut tx, user)
            .await
            .map_err(StorageError::in_transaction)?;
        let created_account = insert_account(&mut tx, created_user.id, account)
            .await
            .map_err(StorageError::in_transaction)?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(format!("commit failed: {e}")))?;

        tracing::debug!(
            user_id = created_user.id,
            account_id = created_account.id,
            provider = %created_account.provider,
            "Created user with linked account"
        );

        Ok((created_user, created_account))
    }

    /// Count all accounts.
    pub async fn count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
