//! User storage trait.
//!
//! Defines the interface for user persistence operations.
//! Implementations are provided by storage backends (e.g., PostgreSQL).

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::User;

/// Storage operations for local users.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by row id.
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<User>>;

    /// Finds a user by verified email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Updates profile fields of a user under optimistic concurrency.
    ///
    /// The write only applies when the stored `version` equals `user.version`.
    /// On success the returned user carries the incremented version.
    ///
    /// # Errors
    ///
    /// - `AuthError::Conflict` if the stored version differs (stale version)
    ///   or the new email belongs to another user
    /// - `AuthError::NotFound` if the user does not exist
    async fn update(&self, user: &User) -> AuthResult<User>;

    /// Counts all users.
    async fn count(&self) -> AuthResult<i64>;
}
