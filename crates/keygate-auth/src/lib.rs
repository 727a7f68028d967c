//! # keygate-auth
//!
//! Authentication core for the Keygate server.
//!
//! This crate provides:
//! - Opaque bearer tokens (generation, hashing, scope-bound validation, revocation)
//! - An expiring key/value session store abstraction with a background collector
//! - OAuth identity resolution that reconciles an external identity with local
//!   user and account records
//! - Axum extractors and handlers for the thin HTTP surface
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`token`] - Token generation and validation
//! - [`storage`] - Storage traits and in-memory backends
//! - [`collector`] - Background reaper task for expiring stores
//! - [`federation`] - OAuth client and identity resolution
//! - [`middleware`] - Bearer authentication extractor and error responses
//! - [`http`] - Axum HTTP handlers
//!
//! ## Backends
//!
//! The durable PostgreSQL backend lives in `keygate-auth-postgres`.

pub mod collector;
pub mod config;
pub mod error;
pub mod federation;
pub mod http;
pub mod middleware;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorKind};
pub use federation::{
    ConflictReason, ExternalProfile, FederatedToken, HttpOAuthClient, IdentityResolution,
    IdentityResolver, OAuthClient, ResolverConfig,
};
pub use http::{CallbackState, callback_handler, logout_handler, me_handler};
pub use middleware::{AuthState, BearerAuth};
pub use storage::{AccountStorage, ExpiringStore, TokenStorage, UserStorage};
pub use token::TokenService;
pub use types::{Account, IssuedToken, NewAccount, NewUser, TokenRecord, TokenScope, User};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keygate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorKind};
    pub use crate::federation::{
        ConflictReason, ExternalProfile, IdentityResolution, IdentityResolver, OAuthClient,
        ResolverConfig,
    };
    pub use crate::middleware::{AuthState, BearerAuth};
    pub use crate::storage::{AccountStorage, ExpiringStore, TokenStorage, UserStorage};
    pub use crate::token::TokenService;
    pub use crate::types::{Account, IssuedToken, NewAccount, NewUser, TokenScope, User};
}
