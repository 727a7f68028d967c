//! Opaque token domain types.
//!
//! # Security
//!
//! - Tokens are stored as SHA-256 digests, never plaintext
//! - The plaintext exists only in [`IssuedToken`] and is handed to the caller once
//! - Debug output of an issued token never includes the plaintext

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Length of a SHA-256 digest in bytes.
pub const TOKEN_HASH_LEN: usize = 32;

/// Purpose a token was issued for.
///
/// Validation requires the stored scope to equal the requested scope exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    /// Long-lived API access.
    Access,
    /// Interactive login session.
    Authentication,
}

impl TokenScope {
    /// Returns the scope as stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Authentication => "authentication",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(Self::Access),
            "authentication" => Ok(Self::Authentication),
            other => Err(format!("unknown token scope: {other}")),
        }
    }
}

/// A token as persisted by a [`TokenStorage`](crate::storage::TokenStorage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// SHA-256 digest of the plaintext.
    pub hash: [u8; TOKEN_HASH_LEN],

    /// Owning user's row id.
    pub user_id: i64,

    /// Instant after which the token is no longer accepted.
    pub expiry: OffsetDateTime,

    /// Purpose the token was issued for.
    pub scope: TokenScope,
}

impl TokenRecord {
    /// Returns `true` if the token is expired at `now`.
    ///
    /// A token whose expiry equals `now` is already expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiry <= now
    }

    /// Hex encoding of the first bytes of the hash, safe to log.
    #[must_use]
    pub fn hash_prefix(&self) -> String {
        hex::encode(&self.hash[..4])
    }
}

/// A freshly generated token.
///
/// `plaintext` is the only copy of the secret. It is never persisted.
#[derive(Clone)]
pub struct IssuedToken {
    /// The bearer credential to hand to the client.
    pub plaintext: String,

    /// SHA-256 digest of `plaintext`.
    pub hash: [u8; TOKEN_HASH_LEN],

    /// Owning user's row id.
    pub user_id: i64,

    /// Expiry instant.
    pub expiry: OffsetDateTime,

    /// Scope the token is bound to.
    pub scope: TokenScope,
}

impl IssuedToken {
    /// Returns the persisted form of this token.
    #[must_use]
    pub fn record(&self) -> TokenRecord {
        TokenRecord {
            hash: self.hash,
            user_id: self.user_id,
            expiry: self.expiry,
            scope: self.scope,
        }
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("plaintext", &"[REDACTED]")
            .field("hash", &hex::encode(&self.hash[..4]))
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}
