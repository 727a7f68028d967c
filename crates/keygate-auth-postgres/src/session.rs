//! Expiring session store backed by a PostgreSQL table.
//!
//! Entries live in a table with the layout
//!
//! ```sql
//! id      VARCHAR(64) PRIMARY KEY
//! data    BYTEA NOT NULL
//! expires BIGINT NOT NULL DEFAULT 0   -- unix seconds, 0 = never
//! ```
//!
//! The table is created on start if missing. Reads filter expired rows in
//! SQL, and a [`Collector`] deletes them in the background.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use keygate_auth::collector::{Collector, DEFAULT_GC_INTERVAL};
use keygate_auth::config::{AuthConfig, is_valid_table_name};
use keygate_auth::storage::session::store_closed;
use keygate_auth::storage::{
    DEFAULT_CALL_TIMEOUT, ExpiringStore, bounded, check_key_len, expires_at,
};
use keygate_auth::{AuthError, AuthResult};

use crate::{PgPool, StorageError};

/// Settings for [`PostgresSessionStore`].
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Table holding the entries. Must be a plain identifier.
    pub table: String,
    /// Interval between collector passes.
    pub gc_interval: Duration,
    /// Delete all entries when the store starts.
    pub reset_on_start: bool,
    /// Upper bound for each statement.
    pub call_timeout: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            table: "sessions".to_string(),
            gc_interval: DEFAULT_GC_INTERVAL,
            reset_on_start: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl SessionStoreConfig {
    /// Builds the store settings from the `[auth]` configuration section.
    #[must_use]
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            table: config.session.table.clone(),
            gc_interval: config.session.gc_interval,
            reset_on_start: config.session.reset_on_start,
            call_timeout: config.storage_timeout,
        }
    }
}

/// Statements for one session table, formatted once at startup.
#[derive(Debug)]
struct SessionQueries {
    create_table: String,
    create_index: String,
    get: String,
    upsert: String,
    delete: String,
    reset: String,
    sweep: String,
    count: String,
}

impl SessionQueries {
    fn for_table(table: &str) -> Self {
        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id VARCHAR(64) PRIMARY KEY NOT NULL DEFAULT '', \
                 data BYTEA NOT NULL, \
                 expires BIGINT NOT NULL DEFAULT 0)"
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {table}_expires_idx ON {table} (expires)"
            ),
            get: format!(
                "SELECT data FROM {table} WHERE id = $1 AND (expires = 0 OR expires > $2)"
            ),
            upsert: format!(
                "INSERT INTO {table} (id, data, expires) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, expires = EXCLUDED.expires"
            ),
            delete: format!("DELETE FROM {table} WHERE id = $1"),
            reset: format!("DELETE FROM {table}"),
            sweep: format!("DELETE FROM {table} WHERE expires > 0 AND expires <= $1"),
            count: format!("SELECT COUNT(*) FROM {table}"),
        }
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

async fn sweep(
    pool: &PgPool,
    queries: &SessionQueries,
    call_timeout: Duration,
) -> AuthResult<u64> {
    bounded(call_timeout, "session sweep", async {
        let result = query(&queries.sweep)
            .bind(now_unix())
            .execute(pool)
            .await
            .map_err(StorageError::from)?;
        Ok::<_, AuthError>(result.rows_affected())
    })
    .await
}

/// [`ExpiringStore`] persisting entries in PostgreSQL.
pub struct PostgresSessionStore {
    pool: Arc<PgPool>,
    queries: Arc<SessionQueries>,
    table: String,
    call_timeout: Duration,
    collector: Mutex<Option<Collector>>,
    closed: AtomicBool,
}

impl PostgresSessionStore {
    /// Prepares the table and starts the collector.
    ///
    /// # Errors
    ///
    /// - `AuthError::Configuration` for an invalid table name or a zero interval
    /// - storage errors from creating or resetting the table
    pub async fn new(pool: Arc<PgPool>, config: SessionStoreConfig) -> AuthResult<Self> {
        if !is_valid_table_name(&config.table) {
            return Err(AuthError::configuration(format!(
                "invalid session table name '{}'",
                config.table
            )));
        }
        if config.gc_interval.is_zero() {
            return Err(AuthError::configuration("session gc_interval must be non-zero"));
        }

        let queries = Arc::new(SessionQueries::for_table(&config.table));

        bounded(config.call_timeout, "session table setup", async {
            query(&queries.create_table)
                .execute(&*pool)
                .await
                .map_err(StorageError::from)?;
            query(&queries.create_index)
                .execute(&*pool)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, AuthError>(())
        })
        .await?;

        bounded(
            config.call_timeout,
            "session column check",
            check_data_column(&pool, &config.table),
        )
        .await?;

        if config.reset_on_start {
            let removed = bounded(config.call_timeout, "session reset", async {
                let result = query(&queries.reset)
                    .execute(&*pool)
                    .await
                    .map_err(StorageError::from)?;
                Ok::<_, AuthError>(result.rows_affected())
            })
            .await?;
            tracing::info!(table = %config.table, removed, "Cleared session table on start");
        }

        let collector = {
            let pool = Arc::clone(&pool);
            let queries = Arc::clone(&queries);
            let call_timeout = config.call_timeout;
            Collector::spawn("postgres-sessions", config.gc_interval, move || {
                let pool = Arc::clone(&pool);
                let queries = Arc::clone(&queries);
                async move { sweep(&pool, &queries, call_timeout).await }
            })
        };

        tracing::debug!(table = %config.table, gc_interval = ?config.gc_interval, "Session store started");

        Ok(Self {
            pool,
            queries,
            table: config.table,
            call_timeout: config.call_timeout,
            collector: Mutex::new(Some(collector)),
            closed: AtomicBool::new(false),
        })
    }

    /// Name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn ensure_open(&self) -> AuthResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(store_closed());
        }
        Ok(())
    }
}

/// Warns when an existing table stores `data` as something other than bytea.
async fn check_data_column(pool: &PgPool, table: &str) -> AuthResult<()> {
    let data_type: Option<String> = query_scalar(
        r#"
        SELECT data_type::text
        FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name = $1
          AND column_name = 'data'
        "#,
    )
    .bind(table)
    .fetch_optional(pool)
    .await
    .map_err(StorageError::from)?;

    if let Some(data_type) = data_type
        && data_type != "bytea"
    {
        tracing::warn!(
            table,
            data_type = %data_type,
            "Session table column 'data' is not bytea; values may not round-trip"
        );
    }
    Ok(())
}

#[async_trait]
impl ExpiringStore for PostgresSessionStore {
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        if key.is_empty() {
            return Ok(None);
        }
        bounded(self.call_timeout, "session get", async {
            let data: Option<Vec<u8>> = query_scalar(&self.queries.get)
                .bind(key)
                .bind(now_unix())
                .fetch_optional(&*self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, AuthError>(data)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> AuthResult<()> {
        self.ensure_open()?;
        if key.is_empty() || value.is_empty() {
            return Ok(());
        }
        check_key_len(key)?;
        let expires = expires_at(now_unix(), ttl);
        bounded(self.call_timeout, "session set", async {
            query(&self.queries.upsert)
                .bind(key)
                .bind(value)
                .bind(expires)
                .execute(&*self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, AuthError>(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        self.ensure_open()?;
        if key.is_empty() {
            return Ok(());
        }
        bounded(self.call_timeout, "session delete", async {
            query(&self.queries.delete)
                .bind(key)
                .execute(&*self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, AuthError>(())
        })
        .await
    }

    async fn reset(&self) -> AuthResult<()> {
        self.ensure_open()?;
        bounded(self.call_timeout, "session reset", async {
            query(&self.queries.reset)
                .execute(&*self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, AuthError>(())
        })
        .await
    }

    async fn sweep_expired(&self) -> AuthResult<u64> {
        self.ensure_open()?;
        sweep(&self.pool, &self.queries, self.call_timeout).await
    }

    async fn len(&self) -> AuthResult<u64> {
        self.ensure_open()?;
        bounded(self.call_timeout, "session count", async {
            let count: i64 = query_scalar(&self.queries.count)
                .fetch_one(&*self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, AuthError>(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn close(&self) -> AuthResult<()> {
        let collector = self.collector.lock().await.take();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(collector) = collector {
            collector.stop().await;
        }
        self.pool.close().await;
        tracing::debug!(table = %self.table, "Session store closed");
        Ok(())
    }
}
