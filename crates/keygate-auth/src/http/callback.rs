//! OAuth callback endpoint.
//!
//! `GET /auth/callback?code=...` exchanges the code server-side, resolves the
//! external identity to a local user, writes a session entry keyed by a
//! fresh session id and mints an `Authentication` token.
//!
//! An unresolvable login answers `409 {"error": "login_failed"}`. The
//! conflict reason is logged, never returned.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::federation::{IdentityResolution, IdentityResolver};
use crate::storage::ExpiringStore;
use crate::token::TokenService;
use crate::types::TokenScope;

/// State for the callback handler.
#[derive(Clone)]
pub struct CallbackState {
    pub resolver: Arc<IdentityResolver>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<dyn ExpiringStore>,
    /// Lifetime of the minted login token.
    pub token_ttl: Duration,
    /// Lifetime of the session entry.
    pub session_ttl: Duration,
}

/// Query parameters sent by the provider.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    /// Set when the user denied consent or the provider failed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Successful login response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub user_id: i64,
    pub outcome: String,
    pub session_id: String,
}

/// Session entry written on login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPayload {
    pub user_id: i64,
    pub provider: String,
    pub outcome: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

fn login_failed() -> Response {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({ "error": "login_failed" })),
    )
        .into_response()
}

/// Handles the OAuth redirect back from the provider.
pub async fn callback_handler(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match complete_login(&state, params).await {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => login_failed(),
        Err(e) => e.into_response(),
    }
}

async fn complete_login(
    state: &CallbackState,
    params: CallbackParams,
) -> AuthResult<Option<CallbackResponse>> {
    if let Some(error) = params.error {
        let provider = state.resolver.config().provider.clone();
        tracing::info!(provider = %provider, error = %error, "Provider returned an error on callback");
        return Err(AuthError::identity_provider(
            provider,
            params.error_description.unwrap_or(error),
        ));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::validation("missing authorization code"))?;

    let resolution = state.resolver.resolve_callback(&code).await?;
    let user_id = match &resolution {
        IdentityResolution::Conflict { reason } => {
            tracing::warn!(reason = %reason, "Federated login failed");
            return Ok(None);
        }
        resolved => resolved.user_id().ok_or_else(|| {
            AuthError::internal("resolved identity without user")
        })?,
    };

    let session_id = Uuid::new_v4().simple().to_string();
    let payload = SessionPayload {
        user_id,
        provider: state.resolver.config().provider.clone(),
        outcome: resolution.as_str().to_string(),
        issued_at: OffsetDateTime::now_utc(),
    };
    let bytes = serde_json::to_vec(&payload)
        .map_err(|e| AuthError::internal(format!("Failed to encode session: {e}")))?;
    state
        .sessions
        .set(&session_id, &bytes, state.session_ttl)
        .await?;

    // A failed session write must not leave a live token behind.
    let issued = match state
        .tokens
        .generate(user_id, state.token_ttl, TokenScope::Authentication)
        .await
    {
        Ok(issued) => issued,
        Err(e) => {
            if let Err(cleanup) = state.sessions.delete(&session_id).await {
                tracing::warn!(error = %cleanup, "Failed to remove session after token error");
            }
            return Err(e);
        }
    };

    tracing::info!(user_id, outcome = %resolution, "Federated login completed");

    Ok(Some(CallbackResponse {
        token: issued.plaintext,
        expires_at: issued.expiry,
        user_id,
        outcome: resolution.as_str().to_string(),
        session_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
        routing::get,
    };
    use tower::ServiceExt;

    use crate::federation::{ExternalProfile, FederatedToken, OAuthClient, ResolverConfig};
    use crate::storage::memory::{InMemoryDirectory, InMemorySessionStore, InMemoryTokenStorage};

    struct StubClient;

    #[async_trait]
    impl OAuthClient for StubClient {
        async fn exchange_code(&self, code: &str) -> AuthResult<FederatedToken> {
            if code == "denied" {
                return Err(AuthError::identity_provider("stub", "invalid_grant"));
            }
            Ok(FederatedToken {
                access_token: code.to_string(),
            })
        }

        async fn fetch_profile(&self, token: &FederatedToken) -> AuthResult<ExternalProfile> {
            Ok(ExternalProfile {
                external_id: token.access_token.clone(),
                email: None,
                email_verified: false,
                display_name: Some("Stub".to_string()),
                avatar_url: None,
            })
        }
    }

    struct Fixture {
        app: Router,
        directory: Arc<InMemoryDirectory>,
        sessions: Arc<InMemorySessionStore>,
        token_records: Arc<InMemoryTokenStorage>,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(InMemoryDirectory::new());
        let sessions = Arc::new(InMemorySessionStore::without_collector());
        let token_records = Arc::new(InMemoryTokenStorage::new());
        let tokens = Arc::new(TokenService::new(token_records.clone(), directory.clone()));
        let resolver = Arc::new(IdentityResolver::new(
            directory.clone(),
            directory.clone(),
            Arc::new(StubClient),
            ResolverConfig::new("stub"),
        ));
        let state = CallbackState {
            resolver,
            tokens: tokens.clone(),
            sessions: sessions.clone(),
            token_ttl: Duration::from_secs(3600),
            session_ttl: Duration::from_secs(3600),
        };
        let app = Router::new()
            .route("/auth/callback", get(callback_handler))
            .with_state(state);
        Fixture {
            app,
            directory,
            sessions,
            token_records,
            tokens,
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_callback_creates_user_and_session() {
        let f = fixture();
        let (status, body) = get_json(f.app.clone(), "/auth/callback?code=ext-1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "created_new");

        let response: CallbackResponse = serde_json::from_value(body).unwrap();
        let user = f
            .tokens
            .validate(&response.token, TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(user.id, response.user_id);

        let stored = f.sessions.get(&response.session_id).await.unwrap().unwrap();
        let payload: SessionPayload = serde_json::from_slice(&stored).unwrap();
        assert_eq!(payload.user_id, response.user_id);
        assert_eq!(payload.provider, "stub");

        let (_, again) = get_json(f.app, "/auth/callback?code=ext-1").await;
        assert_eq!(again["outcome"], "linked_existing");
        assert_eq!(again["user_id"], response.user_id);
    }

    #[tokio::test]
    async fn test_callback_conflict_is_uniform_409() {
        let f = fixture();
        let (_, body) = get_json(f.app.clone(), "/auth/callback?code=ext-2").await;
        f.directory
            .remove_user(body["user_id"].as_i64().unwrap())
            .await;

        let (status, body) = get_json(f.app, "/auth/callback?code=ext-2").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, serde_json::json!({ "error": "login_failed" }));
    }

    #[tokio::test]
    async fn test_callback_missing_code_is_400() {
        let f = fixture();
        let (status, body) = get_json(f.app, "/auth/callback").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_callback_provider_failure_is_502() {
        let f = fixture();
        let (status, _) = get_json(f.app.clone(), "/auth/callback?code=denied").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) =
            get_json(f.app, "/auth/callback?error=access_denied&error_description=nope").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_failed_session_write_leaves_no_token() {
        let f = fixture();
        f.sessions.close().await.unwrap();

        let (status, body) = get_json(f.app, "/auth/callback?code=ext-3").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("token").is_none());
        assert!(f.token_records.is_empty());
    }
}
