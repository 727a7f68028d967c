//! Bearer token authentication extractor.
//!
//! ```ignore
//! async fn handler(BearerAuth(user): BearerAuth) -> impl IntoResponse {
//!     Json(user)
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AuthError;
use crate::token::TokenService;
use crate::types::{TokenScope, User};

/// State required for bearer token authentication.
///
/// Include it in your application state and expose it via `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    /// Token service used for validation.
    pub tokens: Arc<TokenService>,

    /// Scope a presented token must carry.
    pub required_scope: TokenScope,
}

impl AuthState {
    /// Creates a new auth state.
    pub fn new(tokens: Arc<TokenService>, required_scope: TokenScope) -> Self {
        Self {
            tokens,
            required_scope,
        }
    }
}

/// Axum extractor that validates a bearer token and yields its owner.
///
/// # Errors
///
/// Rejects with `AuthError` (which implements `IntoResponse`):
/// - 401 when the header is missing, malformed, unknown or expired
/// - 403 when the token was issued for another scope
/// - 5xx when storage fails
pub struct BearerAuth(pub User);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let token = bearer_token(parts)
            .ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?;

        let user = auth_state
            .tokens
            .validate(token, auth_state.required_scope)
            .await
            .map_err(|e| match e {
                AuthError::Validation { .. } | AuthError::NotFound { .. } => {
                    AuthError::unauthorized("Invalid bearer token")
                }
                other => other,
            })?;

        Ok(BearerAuth(user))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
