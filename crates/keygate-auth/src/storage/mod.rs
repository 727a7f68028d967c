//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - Opaque token records ([`TokenStorage`])
//! - Users and linked accounts ([`UserStorage`], [`AccountStorage`])
//! - Expiring byte-blob session entries ([`ExpiringStore`])
//!
//! # Implementations
//!
//! - [`memory`] - In-process backends built on `dashmap`
//! - `keygate-auth-postgres` - PostgreSQL storage backend

pub mod account;
pub mod memory;
pub mod session;
pub mod token;
pub mod user;

use std::future::Future;
use std::time::Duration;

pub use account::AccountStorage;
pub use session::ExpiringStore;
pub use token::TokenStorage;
pub use user::UserStorage;

use crate::{AuthError, AuthResult};

/// Default upper bound for a single storage call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum length of an expiring-store key, in characters.
pub const MAX_KEY_LEN: usize = 64;

/// Rejects keys longer than [`MAX_KEY_LEN`] characters.
pub fn check_key_len(key: &str) -> AuthResult<()> {
    if key.chars().count() > MAX_KEY_LEN {
        return Err(AuthError::validation(format!(
            "session key exceeds {MAX_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// Computes the stored expiry (unix seconds) for an entry written at `now`.
///
/// A zero `ttl` yields `0`, which means the entry never expires. Any other
/// ttl is rounded up to whole seconds and the result is at least `1`, so a
/// real expiry can never be confused with "never".
#[must_use]
pub fn expires_at(now_unix: i64, ttl: Duration) -> i64 {
    if ttl.is_zero() {
        return 0;
    }
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs = secs.saturating_add(1);
    }
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    now_unix.saturating_add(secs).max(1)
}

/// Returns `true` if an entry with `expires_at` is readable at `now_unix`.
#[must_use]
pub fn is_live(expires_at: i64, now_unix: i64) -> bool {
    expires_at == 0 || expires_at > now_unix
}

/// Returns `true` if the collector should remove an entry with `expires_at`.
#[must_use]
pub fn is_sweepable(expires_at: i64, now_unix: i64) -> bool {
    expires_at > 0 && expires_at <= now_unix
}

/// Runs a storage call under `limit`, mapping an elapsed timer to
/// [`AuthError::Transient`].
pub async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage call timed out");
            Err(AuthError::transient(format!(
                "{operation} timed out after {}ms",
                limit.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_zero_ttl_never_expires() {
        assert_eq!(expires_at(1_700_000_000, Duration::ZERO), 0);
    }

    #[test]
    fn test_expires_at_rounds_up_and_clamps() {
        assert_eq!(expires_at(100, Duration::from_secs(5)), 105);
        assert_eq!(expires_at(100, Duration::from_millis(1)), 101);
        assert_eq!(expires_at(-50, Duration::from_secs(1)), 1);
        assert_eq!(expires_at(0, Duration::from_millis(500)), 1);
    }

    #[test]
    fn test_liveness_and_sweep_are_complementary() {
        assert!(is_live(0, 1_000));
        assert!(!is_sweepable(0, 1_000));
        assert!(is_live(1_001, 1_000));
        assert!(!is_live(1_000, 1_000));
        assert!(is_sweepable(1_000, 1_000));
        assert!(is_sweepable(1, 1_000));
    }

    #[tokio::test]
    async fn test_bounded_times_out_as_transient() {
        let result: AuthResult<()> = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let result = bounded(Duration::from_secs(1), "fast", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let result: AuthResult<()> = bounded(Duration::from_secs(1), "fails", async {
            Err(AuthError::conflict("dup"))
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
    }
}
