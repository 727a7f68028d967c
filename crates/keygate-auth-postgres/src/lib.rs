//! PostgreSQL storage backend for Keygate Auth
//!
//! Provides persistent storage for:
//!
//! - Users and linked OAuth accounts
//! - Opaque token digests
//! - Expiring session entries, with a background collector
//!
//! Tables are created by the embedded migrations in [`migrations`]. The
//! session table is additionally created on demand by
//! [`PostgresSessionStore`] so it can live under a configured name.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth_postgres::{PostgresConfig, UserStorage, pool, migrations};
//!
//! let pool = pool::create_pool(&PostgresConfig::new("postgres://localhost/keygate")).await?;
//! migrations::run(&pool).await?;
//!
//! let user = UserStorage::new(&pool).find_by_email("ada@example.com").await?;
//! ```

pub mod account;
pub mod config;
pub mod migrations;
pub mod pool;
pub mod session;
pub mod storage_adapters;
pub mod token;
pub mod user;

use keygate_auth::AuthError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use account::AccountStorage;
pub use config::PostgresConfig;
pub use session::{PostgresSessionStore, SessionStoreConfig};
pub use storage_adapters::{ArcAccountStorage, ArcTokenStorage, ArcUserStorage};
pub use token::TokenStorage;
pub use user::UserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[source] sqlx_core::Error),

    /// Requested record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint or version check rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A foreign key was violated.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// A multi-statement write failed and was rolled back.
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// No connection became available in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx_core::Error> for StorageError {
    fn from(e: sqlx_core::Error) -> Self {
        match e {
            sqlx_core::Error::Database(ref db) if db.is_unique_violation() => Self::Conflict(
                db.constraint()
                    .map_or_else(|| db.message().to_string(), str::to_string),
            ),
            sqlx_core::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Self::Integrity(db.message().to_string())
            }
            sqlx_core::Error::PoolTimedOut => {
                Self::Timeout("timed out acquiring a connection".to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Wraps an error raised inside a transaction.
    ///
    /// Constraint violations keep their classification so callers can still
    /// tell a lost race from a failed commit.
    #[must_use]
    pub fn in_transaction(self) -> Self {
        match self {
            Self::Database(e) => Self::Transaction(e.to_string()),
            other => other,
        }
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if retrying the call unchanged may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Database(e) => matches!(
                e,
                sqlx_core::Error::PoolTimedOut | sqlx_core::Error::Io(_)
            ),
            _ => false,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            return AuthError::transient(e.to_string());
        }
        match e {
            StorageError::Database(sqlx_core::Error::PoolClosed) => {
                AuthError::storage(keygate_auth::storage::session::STORE_CLOSED)
            }
            StorageError::Database(e) => AuthError::storage(e.to_string()),
            StorageError::NotFound(m) => AuthError::not_found(m),
            StorageError::Conflict(m) => AuthError::conflict(m),
            StorageError::Integrity(m) => AuthError::integrity(m),
            StorageError::Transaction(m) => AuthError::transaction(m),
            StorageError::Timeout(m) => AuthError::transient(m),
            StorageError::InvalidInput(m) => AuthError::validation(m),
            StorageError::Migration(m) => AuthError::storage(m),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Tests
// =============================================================================
