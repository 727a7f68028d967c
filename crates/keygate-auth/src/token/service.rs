//! Token service for minting and validating opaque bearer tokens.
//!
//! # Usage
//!
//! ```ignore
//! use keygate_auth::token::TokenService;
//! use keygate_auth::types::TokenScope;
//!
//! let service = TokenService::new(token_storage, user_storage);
//! let issued = service.generate(user.id, Duration::from_secs(3600), TokenScope::Authentication).await?;
//! let user = service.validate(&issued.plaintext, TokenScope::Authentication).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{DEFAULT_CALL_TIMEOUT, TokenStorage, UserStorage, bounded};
use crate::types::{IssuedToken, TokenRecord, TokenScope, User};

/// RFC 4648 base32 alphabet.
pub const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Length of a plaintext token in characters.
pub const TOKEN_LEN: usize = 26;

/// Hashes a plaintext token with SHA-256.
#[must_use]
pub fn hash_token(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Returns `true` if `plaintext` has the exact shape of a token.
#[must_use]
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LEN && plaintext.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

fn generate_plaintext() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    // 256 is a multiple of 32, so masking keeps the draw uniform
    bytes
        .iter()
        .map(|b| TOKEN_ALPHABET[(b & 0x1f) as usize] as char)
        .collect()
}

/// Mints, validates and revokes opaque tokens.
pub struct TokenService {
    tokens: Arc<dyn TokenStorage>,
    users: Arc<dyn UserStorage>,
    call_timeout: Duration,
}

impl TokenService {
    /// Creates a token service over the given storages.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenStorage>, users: Arc<dyn UserStorage>) -> Self {
        Self {
            tokens,
            users,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the upper bound for each storage call.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Generates a token for `user_id` valid for `ttl`.
    ///
    /// The returned plaintext is the only copy; the store keeps its digest.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a zero or unrepresentable ttl, or
    /// the storage error if the insert fails.
    pub async fn generate(
        &self,
        user_id: i64,
        ttl: Duration,
        scope: TokenScope,
    ) -> AuthResult<IssuedToken> {
        if ttl.is_zero() {
            return Err(AuthError::validation("token ttl must be positive"));
        }
        let ttl = time::Duration::try_from(ttl)
            .map_err(|_| AuthError::validation("token ttl out of range"))?;
        let expiry = OffsetDateTime::now_utc()
            .checked_add(ttl)
            .ok_or_else(|| AuthError::validation("token ttl out of range"))?;

        let plaintext = generate_plaintext();
        let issued = IssuedToken {
            hash: hash_token(&plaintext),
            plaintext,
            user_id,
            expiry,
            scope,
        };

        bounded(
            self.call_timeout,
            "token insert",
            self.tokens.insert(&issued.record()),
        )
        .await?;

        tracing::debug!(user_id, scope = %scope, "Issued token");
        Ok(issued)
    }

    /// Validates a presented token against the current time.
    pub async fn validate(&self, presented: &str, required_scope: TokenScope) -> AuthResult<User> {
        self.validate_at(presented, required_scope, OffsetDateTime::now_utc())
            .await
    }

    /// Validates a presented token as of `now`.
    ///
    /// # Errors
    ///
    /// - `Validation` if the token is not 26 base32 characters (no I/O happens)
    /// - `NotFound` if no token has this digest
    /// - `Expired` if the expiry is at or before `now`
    /// - `ScopeMismatch` if the token was issued for another scope
    /// - `Integrity` if the owning user no longer exists
    pub async fn validate_at(
        &self,
        presented: &str,
        required_scope: TokenScope,
        now: OffsetDateTime,
    ) -> AuthResult<User> {
        if !is_well_formed(presented) {
            return Err(AuthError::validation(
                "token must be 26 characters of the base32 alphabet",
            ));
        }

        let hash = hash_token(presented);
        let record: TokenRecord = bounded(
            self.call_timeout,
            "token lookup",
            self.tokens.find_by_hash(&hash),
        )
        .await?
        .ok_or_else(|| AuthError::not_found("token"))?;

        if record.is_expired_at(now) {
            return Err(AuthError::Expired);
        }
        if record.scope != required_scope {
            return Err(AuthError::scope_mismatch(
                required_scope.as_str(),
                record.scope.as_str(),
            ));
        }

        let user = bounded(
            self.call_timeout,
            "token owner lookup",
            self.users.find_by_id(record.user_id),
        )
        .await?;

        user.ok_or_else(|| {
            tracing::error!(
                user_id = record.user_id,
                hash = %record.hash_prefix(),
                "Token references a user that does not exist"
            );
            AuthError::integrity(format!("token owner {} does not exist", record.user_id))
        })
    }

    /// Deletes every token of `scope` for `user_id`. Returns the count removed.
    pub async fn revoke_all(&self, scope: TokenScope, user_id: i64) -> AuthResult<u64> {
        let removed = bounded(
            self.call_timeout,
            "token revoke",
            self.tokens.delete_all_for_user(scope, user_id),
        )
        .await?;
        tracing::info!(user_id, scope = %scope, removed, "Revoked tokens");
        Ok(removed)
    }

    /// Deletes expired token records.
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        bounded(
            self.call_timeout,
            "token purge",
            self.tokens.delete_expired(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::storage::memory::{InMemoryDirectory, InMemoryTokenStorage};
    use crate::types::NewUser;

    async fn setup() -> (TokenService, Arc<InMemoryDirectory>, User) {
        let directory = Arc::new(InMemoryDirectory::new());
        let user = directory
            .insert_user(&NewUser {
                email: Some("ada@example.com".to_string()),
                display_name: Some("Ada".to_string()),
                avatar_url: None,
            })
            .await
            .unwrap();
        let service = TokenService::new(Arc::new(InMemoryTokenStorage::new()), directory.clone());
        (service, directory, user)
    }

    #[test]
    fn test_generated_plaintext_shape() {
        for _ in 0..100 {
            let token = generate_plaintext();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(is_well_formed(&token));
        }
    }

    #[test]
    fn test_generated_plaintexts_are_unique() {
        let tokens: HashSet<String> = (0..10_000).map(|_| generate_plaintext()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_is_well_formed_rejects_bad_shapes() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXYZA"));
        assert!(!is_well_formed("abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY1"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY="));
        assert!(is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY7"));
    }

    #[test]
    fn test_hash_token_is_sha256() {
        let hash = hash_token("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, hash_token("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert_ne!(hash, hash_token("ABCDEFGHIJKLMNOPQRSTUVWXY2"));
    }

    #[tokio::test]
    async fn test_generate_then_validate() {
        let (service, _, user) = setup().await;
        let issued = service
            .generate(user.id, Duration::from_secs(3600), TokenScope::Authentication)
            .await
            .unwrap();

        assert_eq!(issued.hash, hash_token(&issued.plaintext));
        let found = service
            .validate(&issued.plaintext, TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_validate_after_expiry() {
        let (service, _, user) = setup().await;
        let issued = service
            .generate(user.id, Duration::from_secs(60), TokenScope::Access)
            .await
            .unwrap();

        let before = issued.expiry - time::Duration::seconds(1);
        assert!(
            service
                .validate_at(&issued.plaintext, TokenScope::Access, before)
                .await
                .is_ok()
        );

        let err = service
            .validate_at(&issued.plaintext, TokenScope::Access, issued.expiry)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn test_validate_scope_mismatch() {
        let (service, _, user) = setup().await;
        let issued = service
            .generate(user.id, Duration::from_secs(60), TokenScope::Authentication)
            .await
            .unwrap();

        let err = service
            .validate(&issued.plaintext, TokenScope::Access)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ScopeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_validate_malformed_and_unknown() {
        let (service, _, _) = setup().await;

        let err = service
            .validate("not-a-token", TokenScope::Access)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation { .. }));

        let err = service
            .validate(&generate_plaintext(), TokenScope::Access)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_validate_missing_owner_is_integrity_error() {
        let (service, directory, user) = setup().await;
        let issued = service
            .generate(user.id, Duration::from_secs(60), TokenScope::Access)
            .await
            .unwrap();
        directory.remove_user(user.id).await;

        let err = service
            .validate(&issued.plaintext, TokenScope::Access)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_revoke_all_only_touches_scope() {
        let (service, _, user) = setup().await;
        let ttl = Duration::from_secs(60);
        let a1 = service.generate(user.id, ttl, TokenScope::Authentication).await.unwrap();
        let a2 = service.generate(user.id, ttl, TokenScope::Authentication).await.unwrap();
        let access = service.generate(user.id, ttl, TokenScope::Access).await.unwrap();

        assert_eq!(
            service
                .revoke_all(TokenScope::Authentication, user.id)
                .await
                .unwrap(),
            2
        );
        for token in [&a1, &a2] {
            let err = service
                .validate(&token.plaintext, TokenScope::Authentication)
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }
        assert!(service.validate(&access.plaintext, TokenScope::Access).await.is_ok());

        assert_eq!(
            service
                .revoke_all(TokenScope::Authentication, user.id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_generate_rejects_zero_ttl() {
        let (service, _, user) = setup().await;
        let err = service
            .generate(user.id, Duration::ZERO, TokenScope::Access)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation { .. }));
    }
}
