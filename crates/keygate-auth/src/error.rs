//! Authentication error types.
//!
//! Every failure that crosses a component boundary is an [`AuthError`].
//! The enumerated [`ErrorKind`] is what the HTTP layer maps to a status code;
//! the mapping lives in `middleware::error` and is independent of how errors
//! are raised and propagated.

use std::fmt;

/// Errors that can occur while issuing or validating credentials, storing
/// session data, or resolving federated identities.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed input, rejected before any I/O.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what was malformed.
        message: String,
    },

    /// The request carries no usable credential.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// No matching credential or record.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// The credential has passed its expiry.
    #[error("Token expired")]
    Expired,

    /// The credential was issued for a different scope.
    #[error("Scope mismatch: required {required}, token has {actual}")]
    ScopeMismatch {
        /// Scope the caller asked for.
        required: String,
        /// Scope stored with the token.
        actual: String,
    },

    /// Persisted state violates a referential invariant.
    #[error("Integrity error: {message}")]
    Integrity {
        /// Which invariant is broken.
        message: String,
    },

    /// A multi-statement write could not commit.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Why the transaction failed.
        message: String,
    },

    /// A uniqueness constraint or optimistic version check rejected a write.
    #[error("Conflict: {message}")]
    Conflict {
        /// Which constraint fired.
        message: String,
    },

    /// Timeout or connection failure. Safe for the caller to retry.
    #[error("Transient error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Any other storage failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The external OAuth provider failed or returned unusable data.
    #[error("Identity provider error: {provider} - {message}")]
    IdentityProvider {
        /// The provider name.
        provider: String,
        /// Description of the error.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `ScopeMismatch` error.
    #[must_use]
    pub fn scope_mismatch(required: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ScopeMismatch {
            required: required.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Integrity` error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Creates a new `Transaction` error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Transient` error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IdentityProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the enumerated kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Expired => ErrorKind::Expired,
            Self::ScopeMismatch { .. } => ErrorKind::ScopeMismatch,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Transaction { .. } => ErrorKind::Transaction,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::IdentityProvider { .. } => ErrorKind::IdentityProvider,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns `true` if the caller may retry the operation unchanged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns `true` if this is a uniqueness or version conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the error describes a bad credential rather than a
    /// failure of the system.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Unauthorized { .. }
                | Self::NotFound { .. }
                | Self::Expired
                | Self::ScopeMismatch { .. }
        )
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.is_credential_error() || self.is_conflict()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

/// Enumerated error kinds, used as the key of the HTTP status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input.
    Validation,
    /// Missing credential.
    Unauthorized,
    /// No matching record.
    NotFound,
    /// Credential expired.
    Expired,
    /// Credential scope differs.
    ScopeMismatch,
    /// Referential invariant broken.
    Integrity,
    /// Multi-statement write failed.
    Transaction,
    /// Unique or version conflict.
    Conflict,
    /// Retryable infrastructure failure.
    Transient,
    /// Other storage failure.
    Storage,
    /// External provider failure.
    IdentityProvider,
    /// Invalid configuration.
    Configuration,
    /// Unexpected failure.
    Internal,
}

impl ErrorKind {
    /// Returns the stable snake_case name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::ScopeMismatch => "scope_mismatch",
            Self::Integrity => "integrity",
            Self::Transaction => "transaction",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Storage => "storage",
            Self::IdentityProvider => "identity_provider",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
