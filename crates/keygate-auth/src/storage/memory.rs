//! In-process storage backends.
//!
//! These implement the storage traits without a database. They are used by
//! unit tests and by single-process deployments that do not need durability.
//! Semantics match the PostgreSQL backend: uniqueness constraints raise
//! `Conflict`, the user+account creation is all-or-nothing, and the session
//! store runs the same collector.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::session::store_closed;
use super::{
    AccountStorage, ExpiringStore, TokenStorage, UserStorage, check_key_len, expires_at, is_live,
    is_sweepable,
};
use crate::collector::Collector;
use crate::types::{Account, NewAccount, NewUser, TokenRecord, TokenScope, User};
use crate::{AuthError, AuthResult};

// =============================================================================
// Tokens
// =============================================================================

/// Token records keyed by digest.
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    records: DashMap<[u8; 32], TokenRecord>,
}

impl InMemoryTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenStorage for InMemoryTokenStorage {
    async fn insert(&self, record: &TokenRecord) -> AuthResult<()> {
        self.records.insert(record.hash, record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, hash: &[u8; 32]) -> AuthResult<Option<TokenRecord>> {
        Ok(self.records.get(hash).map(|r| r.value().clone()))
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> AuthResult<u64> {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(r.user_id == user_id && r.scope == scope));
        Ok((before - self.records.len()) as u64)
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.records.len();
        self.records.retain(|_, r| !r.is_expired_at(now));
        Ok((before - self.records.len()) as u64)
    }
}

// =============================================================================
// Users and accounts
// =============================================================================

#[derive(Debug, Default)]
struct Directory {
    users: BTreeMap<i64, User>,
    accounts: BTreeMap<i64, Account>,
    next_user_id: i64,
    next_account_id: i64,
}

impl Directory {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email.as_deref() == Some(email) && Some(u.id) != except)
    }

    fn account_taken(&self, provider: &str, provider_account_id: &str) -> bool {
        self.accounts
            .values()
            .any(|a| a.provider == provider && a.provider_account_id == provider_account_id)
    }

    fn build_user(&mut self, user: &NewUser) -> User {
        self.next_user_id += 1;
        User {
            id: self.next_user_id,
            uuid: Uuid::new_v4(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        }
    }

    fn build_account(&mut self, user_id: i64, account: &NewAccount) -> Account {
        self.next_account_id += 1;
        Account {
            id: self.next_account_id,
            uuid: Uuid::new_v4(),
            user_id,
            account_type: account.account_type.clone(),
            provider: account.provider.clone(),
            provider_account_id: account.provider_account_id.clone(),
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        }
    }
}

/// Users and accounts behind one lock, so multi-record writes are atomic.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: Mutex<Directory>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user directly.
    pub async fn insert_user(&self, user: &NewUser) -> AuthResult<User> {
        let mut dir = self.inner.lock().await;
        if let Some(email) = user.email.as_deref()
            && dir.email_taken(email, None)
        {
            return Err(AuthError::conflict("users_email_key"));
        }
        let created = dir.build_user(user);
        dir.users.insert(created.id, created.clone());
        Ok(created)
    }

    /// Removes a user without touching its accounts.
    ///
    /// Mirrors a deletion that bypassed referential enforcement.
    pub async fn remove_user(&self, id: i64) -> bool {
        self.inner.lock().await.users.remove(&id).is_some()
    }
}

#[async_trait]
impl UserStorage for InMemoryDirectory {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let dir = self.inner.lock().await;
        Ok(dir
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn update(&self, user: &User) -> AuthResult<User> {
        let mut dir = self.inner.lock().await;
        let stored_version = match dir.users.get(&user.id) {
            Some(stored) => stored.version,
            None => return Err(AuthError::not_found(format!("user {}", user.id))),
        };
        if stored_version != user.version {
            return Err(AuthError::conflict(format!(
                "stale version for user {}: expected {}, found {}",
                user.id, user.version, stored_version
            )));
        }
        if let Some(email) = user.email.as_deref()
            && dir.email_taken(email, Some(user.id))
        {
            return Err(AuthError::conflict("users_email_key"));
        }

        let mut updated = user.clone();
        updated.version += 1;
        dir.users.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn count(&self) -> AuthResult<i64> {
        Ok(self.inner.lock().await.users.len() as i64)
    }
}

#[async_trait]
impl AccountStorage for InMemoryDirectory {
    async fn find_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AuthResult<Option<Account>> {
        let dir = self.inner.lock().await;
        Ok(dir
            .accounts
            .values()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .cloned())
    }

    async fn create(&self, user_id: i64, account: &NewAccount) -> AuthResult<Account> {
        let mut dir = self.inner.lock().await;
        if !dir.users.contains_key(&user_id) {
            return Err(AuthError::integrity(format!("user {user_id} does not exist")));
        }
        if dir.account_taken(&account.provider, &account.provider_account_id) {
            return Err(AuthError::conflict("accounts_provider_key"));
        }
        let created = dir.build_account(user_id, account);
        dir.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_with_user(
        &self,
        user: &NewUser,
        account: &NewAccount,
    ) -> AuthResult<(User, Account)> {
        let mut dir = self.inner.lock().await;
        if let Some(email) = user.email.as_deref()
            && dir.email_taken(email, None)
        {
            return Err(AuthError::conflict("users_email_key"));
        }
        if dir.account_taken(&account.provider, &account.provider_account_id) {
            return Err(AuthError::conflict("accounts_provider_key"));
        }

        let created_user = dir.build_user(user);
        let created_account = dir.build_account(created_user.id, account);
        dir.users.insert(created_user.id, created_user.clone());
        dir.accounts.insert(created_account.id, created_account.clone());
        Ok((created_user, created_account))
    }

    async fn count(&self) -> AuthResult<i64> {
        Ok(self.inner.lock().await.accounts.len() as i64)
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: i64,
}

/// Expiring byte-blob store held in a `DashMap`.
#[derive(Debug)]
pub struct InMemorySessionStore {
    entries: Arc<DashMap<String, Entry>>,
    collector: Mutex<Option<Collector>>,
    closed: AtomicBool,
}

impl InMemorySessionStore {
    /// Creates a store whose collector runs every `gc_interval`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(gc_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());
        let swept = entries.clone();
        let collector = Collector::spawn("memory-sessions", gc_interval, move || {
            let swept = swept.clone();
            async move { Ok(sweep(&swept)) }
        });

        Self {
            entries,
            collector: Mutex::new(Some(collector)),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a store without a background collector.
    ///
    /// Expired entries are still hidden from reads and can be removed with
    /// [`ExpiringStore::sweep_expired`].
    #[must_use]
    pub fn without_collector() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            collector: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> AuthResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(store_closed());
        }
        Ok(())
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn sweep(entries: &DashMap<String, Entry>) -> u64 {
    let now = now_unix();
    let before = entries.len();
    entries.retain(|_, e| !is_sweepable(e.expires_at, now));
    before.saturating_sub(entries.len()) as u64
}

#[async_trait]
impl ExpiringStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        if key.is_empty() {
            return Ok(None);
        }
        let now = now_unix();
        Ok(self
            .entries
            .get(key)
            .filter(|e| is_live(e.expires_at, now))
            .map(|e| e.data.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> AuthResult<()> {
        self.ensure_open()?;
        if key.is_empty() || value.is_empty() {
            return Ok(());
        }
        check_key_len(key)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                data: value.to_vec(),
                expires_at: expires_at(now_unix(), ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        self.ensure_open()?;
        if !key.is_empty() {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn reset(&self) -> AuthResult<()> {
        self.ensure_open()?;
        self.entries.clear();
        Ok(())
    }

    async fn sweep_expired(&self) -> AuthResult<u64> {
        self.ensure_open()?;
        Ok(sweep(&self.entries))
    }

    async fn len(&self) -> AuthResult<u64> {
        self.ensure_open()?;
        Ok(self.entries.len() as u64)
    }

    async fn close(&self) -> AuthResult<()> {
        let collector = self.collector.lock().await.take();
        self.closed.store(true, Ordering::Release);
        if let Some(collector) = collector {
            collector.stop().await;
        }
        Ok(())
    }
}
