//! Error responses for the HTTP surface.
//!
//! Status codes come from [`ERROR_TABLE`], keyed by [`ErrorKind`]. Client
//! errors carry their message; server errors carry a generic message and the
//! detail is logged instead.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::error::{AuthError, ErrorKind};

/// Kind → (HTTP status, public error code).
pub static ERROR_TABLE: [(ErrorKind, StatusCode, &str); 13] = [
    (ErrorKind::Validation, StatusCode::BAD_REQUEST, "invalid_request"),
    (ErrorKind::Unauthorized, StatusCode::UNAUTHORIZED, "unauthorized"),
    (ErrorKind::NotFound, StatusCode::UNAUTHORIZED, "invalid_token"),
    (ErrorKind::Expired, StatusCode::UNAUTHORIZED, "invalid_token"),
    (ErrorKind::ScopeMismatch, StatusCode::FORBIDDEN, "insufficient_scope"),
    (ErrorKind::Integrity, StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    (ErrorKind::Transaction, StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    (ErrorKind::Conflict, StatusCode::CONFLICT, "conflict"),
    (ErrorKind::Transient, StatusCode::SERVICE_UNAVAILABLE, "temporarily_unavailable"),
    (ErrorKind::Storage, StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    (ErrorKind::IdentityProvider, StatusCode::BAD_GATEWAY, "identity_provider_error"),
    (ErrorKind::Configuration, StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    (ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
];

/// Looks up the status and public code for `kind`.
#[must_use]
pub fn status_for(kind: ErrorKind) -> (StatusCode, &'static str) {
    ERROR_TABLE
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, status, code)| (*status, *code))
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "server_error"))
}

/// Builds the `{"error", "message"}` response body.
#[must_use]
pub fn error_body(code: &str, message: &str) -> Value {
    json!({ "error": code, "message": message })
}

fn public_message(error: &AuthError, status: StatusCode) -> String {
    match status {
        StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
        StatusCode::BAD_GATEWAY => "Identity provider request failed".to_string(),
        s if s.is_server_error() => "Internal server error".to_string(),
        _ => error.to_string(),
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, code) = status_for(kind);

        if status.is_server_error() {
            tracing::error!(kind = %kind, error = %self, "Request failed");
        } else {
            tracing::debug!(kind = %kind, error = %self, "Request rejected");
        }

        let body = error_body(code, &public_message(&self, status));
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }

        response
    }
}
