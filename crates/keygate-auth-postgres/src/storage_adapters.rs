//! Arc-owning storage adapters.
//!
//! The storage types in this crate borrow a pool for the duration of a call.
//! These wrappers own an `Arc<PgPool>` instead, so they can be handed to the
//! token service and identity resolver as `Arc<dyn Trait>`.

use std::sync::Arc;

use async_trait::async_trait;

use keygate_auth::AuthResult;
use keygate_auth::storage::{
    AccountStorage as AccountStorageTrait, TokenStorage as TokenStorageTrait,
    UserStorage as UserStorageTrait,
};
use keygate_auth::types::{Account, NewAccount, NewUser, TokenRecord, TokenScope, User};

use crate::PgPool;
use crate::account::AccountStorage;
use crate::token::TokenStorage;
use crate::user::UserStorage;

// =============================================================================
// Users
// =============================================================================

/// Arc-owning PostgreSQL user storage adapter.
#[derive(Clone)]
pub struct ArcUserStorage {
    pool: Arc<PgPool>,
}

impl ArcUserStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStorageTrait for ArcUserStorage {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.find_by_id(id).await?)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.find_by_email(email).await?)
    }

    async fn update(&self, user: &User) -> AuthResult<User> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.update(user).await?)
    }

    async fn count(&self) -> AuthResult<i64> {
        let storage = UserStorage::new(&self.pool);
        Ok(storage.count().await?)
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Arc-owning PostgreSQL account storage adapter.
#[derive(Clone)]
pub struct ArcAccountStorage {
    pool: Arc<PgPool>,
}

impl ArcAccountStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStorageTrait for ArcAccountStorage {
    async fn find_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AuthResult<Option<Account>> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage
            .find_by_provider(provider, provider_account_id)
            .await?)
    }

    async fn create(&self, user_id: i64, account: &NewAccount) -> AuthResult<Account> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage.create(user_id, account).await?)
    }

    async fn create_with_user(
        &self,
        user: &NewUser,
        account: &NewAccount,
    ) -> AuthResult<(User, Account)> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage.create_with_user(user, account).await?)
    }

    async fn count(&self) -> AuthResult<i64> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage.count().await?)
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// Arc-owning PostgreSQL token storage adapter.
#[derive(Clone)]
pub struct ArcTokenStorage {
    pool: Arc<PgPool>,
}

impl ArcTokenStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStorageTrait for ArcTokenStorage {
    async fn insert(&self, record: &TokenRecord) -> AuthResult<()> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.insert(record).await?)
    }

    async fn find_by_hash(&self, hash: &[u8; 32]) -> AuthResult<Option<TokenRecord>> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.find_by_hash(hash).await?)
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> AuthResult<u64> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.delete_all_for_user(scope, user_id).await?)
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.delete_expired().await?)
    }
}
