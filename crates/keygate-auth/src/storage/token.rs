//! Opaque token storage trait.
//!
//! Only the SHA-256 digest of a token is persisted. Lookups are by digest,
//! so a presented token is hashed once and found with a single indexed read.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{TokenRecord, TokenScope};

/// Storage trait for opaque bearer token records.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Persists a new token record.
    ///
    /// Two records for the same user and scope may coexist.
    async fn insert(&self, record: &TokenRecord) -> AuthResult<()>;

    /// Finds a token record by its digest.
    ///
    /// Returns `None` when no record matches. Expired records are returned as
    /// stored; expiry is judged by the caller against its own clock.
    async fn find_by_hash(&self, hash: &[u8; 32]) -> AuthResult<Option<TokenRecord>>;

    /// Deletes every token of `scope` belonging to `user_id`.
    ///
    /// Returns the number of records deleted. Zero is not an error.
    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> AuthResult<u64>;

    /// Deletes records whose expiry has passed.
    ///
    /// Returns the number of records deleted.
    async fn delete_expired(&self) -> AuthResult<u64>;
}
