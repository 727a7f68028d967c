//! HTTP middleware for authentication.
//!
//! This module provides:
//!
//! - [`BearerAuth`], an axum extractor validating `Authorization: Bearer` tokens
//! - `IntoResponse` for [`AuthError`](crate::AuthError), driven by [`ERROR_TABLE`]
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use keygate_auth::middleware::{AuthState, BearerAuth};
//!
//! async fn me(BearerAuth(user): BearerAuth) -> String {
//!     format!("Hello, {}!", user.uuid)
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .with_state(AuthState::new(token_service, TokenScope::Authentication));
//! ```

pub mod auth;
pub mod error;

pub use auth::{AuthState, BearerAuth};
pub use error::{ERROR_TABLE, error_body, status_for};
