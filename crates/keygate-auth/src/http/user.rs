//! Handlers for the authenticated user.

use axum::{Json, extract::State, http::StatusCode};

use crate::error::AuthError;
use crate::middleware::{AuthState, BearerAuth};
use crate::types::{TokenScope, User};

/// `GET /me`: returns the user owning the presented token.
pub async fn me_handler(BearerAuth(user): BearerAuth) -> Json<User> {
    Json(user)
}

/// `POST /auth/logout`: revokes every login token of the caller.
///
/// Other sessions of the same user are logged out too.
pub async fn logout_handler(
    State(state): State<AuthState>,
    BearerAuth(user): BearerAuth,
) -> Result<StatusCode, AuthError> {
    state
        .tokens
        .revoke_all(TokenScope::Authentication, user.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
