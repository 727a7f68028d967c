//! User storage backed by the `users` table.

use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use keygate_auth::types::{NewUser, User};

use crate::{PgPool, StorageError, StorageResult};

pub(crate) const USER_COLUMNS: &str =
    "id, uuid, email, display_name, avatar_url, created_at, version";

pub(crate) type UserRow = (
    i64,
    Uuid,
    Option<String>,
    Option<String>,
    Option<String>,
    OffsetDateTime,
    i32,
);

pub(crate) fn user_from_row(row: UserRow) -> User {
    let (id, uuid, email, display_name, avatar_url, created_at, version) = row;
    User {
        id,
        uuid,
        email,
        display_name,
        avatar_url,
        created_at,
        version,
    }
}

/// Inserts a user on an existing connection, usually inside a transaction.
pub(crate) async fn insert_user(conn: &mut PgConnection, user: &NewUser) -> StorageResult<User> {
    let sql = format!(
        "INSERT INTO users (uuid, email, display_name, avatar_url) \
         VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
    );
    let row: UserRow = query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .fetch_one(conn)
        .await?;
    Ok(user_from_row(row))
}

/// PostgreSQL storage for users.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    /// Create a new user storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by row id.
    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = query_as(&sql).bind(id).fetch_optional(self.pool).await?;
        Ok(row.map(user_from_row))
    }

    /// Find a user by email.
    pub async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row: Option<UserRow> = query_as(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(user_from_row))
    }

    /// Insert a standalone user with no linked account.
    pub async fn create(&self, user: &NewUser) -> StorageResult<User> {
        let mut conn = self.pool.acquire().await?;
        insert_user(&mut conn, user).await
    }

    /// Update profile fields if the stored version still matches.
    ///
    /// # Errors
    ///
    /// - `StorageError::Conflict` on a stale version or a taken email
    /// - `StorageError::NotFound` if the user is gone
    pub async fn update(&self, user: &User) -> StorageResult<User> {
        let sql = format!(
            "UPDATE users SET email = $3, display_name = $4, avatar_url = $5, \
             version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = query_as(&sql)
            .bind(user.id)
            .bind(user.version)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(&user.avatar_url)
            .fetch_optional(self.pool)
            .await?;

        if let Some(row) = row {
            return Ok(user_from_row(row));
        }

        let current: Option<i32> = query_scalar("SELECT version FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_optional(self.pool)
            .await?;

        match current {
            Some(version) => Err(StorageError::conflict(format!(
                "stale version for user {}: expected {}, found {}",
                user.id, user.version, version
            ))),
            None => Err(StorageError::not_found(format!("user {}", user.id))),
        }
    }

    /// Count all users.
    pub async fn count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
