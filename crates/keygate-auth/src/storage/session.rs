//! Expiring key/value store trait.
//!
//! A generic byte-blob store with a per-entry time to live. Backends run a
//! background collector (see [`crate::collector`]) that physically removes
//! expired entries; reads never return an expired entry regardless of
//! whether the collector has caught up.
//!
//! # Contract
//!
//! - `set` with an empty key or an empty value is a silent no-op
//! - `get` with an empty key returns `None` without touching storage
//! - a zero ttl stores the entry forever (`expires_at = 0`)
//! - after `close`, every operation fails with `Storage("store closed")`

use std::time::Duration;

use async_trait::async_trait;

use crate::{AuthError, AuthResult};

/// Message carried by errors from a closed store.
pub const STORE_CLOSED: &str = "store closed";

/// Returns the error every operation on a closed store reports.
#[must_use]
pub fn store_closed() -> AuthError {
    AuthError::storage(STORE_CLOSED)
}

/// Storage trait for expiring session entries.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `None` for unknown, expired or empty keys.
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> AuthResult<()>;

    /// Removes the entry under `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> AuthResult<()>;

    /// Removes every entry.
    async fn reset(&self) -> AuthResult<()>;

    /// Runs one collection pass now and returns the number of entries removed.
    async fn sweep_expired(&self) -> AuthResult<u64>;

    /// Counts stored entries, including expired ones not yet collected.
    async fn len(&self) -> AuthResult<u64>;

    /// Stops the collector and releases the backend.
    ///
    /// Idempotent. An in-flight collection pass finishes before this returns.
    async fn close(&self) -> AuthResult<()>;
}
