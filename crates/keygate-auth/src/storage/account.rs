//! Linked account storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Account, NewAccount, NewUser, User};

/// Storage operations for accounts linking external identities to users.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Finds the account for `(provider, provider_account_id)`.
    async fn find_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AuthResult<Option<Account>>;

    /// Links a new account to an existing user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if `(provider, provider_account_id)` is
    /// already linked.
    async fn create(&self, user_id: i64, account: &NewAccount) -> AuthResult<Account>;

    /// Creates a user and its first account atomically.
    ///
    /// Either both rows exist afterwards or neither does.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if either uniqueness constraint fires,
    /// `AuthError::Transaction` if the transaction cannot commit.
    async fn create_with_user(&self, user: &NewUser, account: &NewAccount)
    -> AuthResult<(User, Account)>;

    /// Counts all accounts.
    async fn count(&self) -> AuthResult<i64>;
}
