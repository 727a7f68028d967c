use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use keygate_auth::collector::Collector;
use keygate_auth::federation::{HttpOAuthClient, IdentityResolver, ResolverConfig};
use keygate_auth::storage::{AccountStorage, ExpiringStore, TokenStorage, UserStorage};
use keygate_auth::{
    AuthState, CallbackState, TokenScope, TokenService, callback_handler, logout_handler,
    me_handler,
};
use keygate_auth_postgres::{
    ArcAccountStorage, ArcTokenStorage, ArcUserStorage, PgPool, PostgresSessionStore,
    SessionStoreConfig, migrations, pool,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::config::AppConfig;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for the authenticated routes.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub pool: Arc<PgPool>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Builds the router.
///
/// `/auth/callback` is only mounted when `callback` is set.
pub fn build_app(state: AppState, callback: Option<CallbackState>) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/me", get(me_handler))
        .route("/auth/logout", post(logout_handler))
        .with_state(state);

    if let Some(callback) = callback {
        app = app.merge(
            Router::new()
                .route("/auth/callback", get(callback_handler))
                .with_state(callback),
        );
    }

    app.layer(CatchPanicLayer::new()).layer(
        TraceLayer::new_for_http()
            // Path only: the callback query string carries the authorization code.
            .make_span_with(|req: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.path = %req.uri().path(),
                    http.status_code = tracing::field::Empty,
                )
            })
            .on_response(
                |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                    span.record(
                        "http.status_code",
                        tracing::field::display(res.status().as_u16()),
                    );
                    tracing::info!(
                        http.status = res.status().as_u16(),
                        elapsed_ms = latency.as_millis() as u64,
                        "request handled"
                    );
                },
            ),
    )
}

async fn healthz(State(state): State<AppState>) -> Response {
    match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, pool::ping(&state.pool)).await {
        Ok(Ok(())) => Json(json!({ "status": "ok" })).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Health check failed");
            unavailable()
        }
        Err(_) => {
            tracing::warn!("Health check timed out");
            unavailable()
        }
    }
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unavailable" })),
    )
        .into_response()
}

/// Periodically deletes expired tokens.
fn spawn_token_purge(tokens: Arc<TokenService>, period: Duration) -> Collector {
    Collector::spawn("token-purge", period, move || {
        let tokens = tokens.clone();
        async move { tokens.purge_expired().await }
    })
}

pub struct KeygateServer {
    addr: SocketAddr,
    app: Router,
    sessions: Arc<dyn ExpiringStore>,
    token_purge: Collector,
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Connects storage, starts background collectors and builds the router.
    pub async fn build(self) -> anyhow::Result<KeygateServer> {
        let cfg = self.config;
        let auth = &cfg.auth;

        let pool = Arc::new(pool::create_pool(&cfg.postgres).await?);
        if cfg.postgres.run_migrations {
            migrations::run(&pool).await?;
        }

        let users: Arc<dyn UserStorage> = Arc::new(ArcUserStorage::new(pool.clone()));
        let accounts: Arc<dyn AccountStorage> = Arc::new(ArcAccountStorage::new(pool.clone()));
        let token_storage: Arc<dyn TokenStorage> = Arc::new(ArcTokenStorage::new(pool.clone()));

        let tokens = Arc::new(
            TokenService::new(token_storage, users.clone()).with_call_timeout(auth.storage_timeout),
        );

        let sessions: Arc<dyn ExpiringStore> = Arc::new(
            PostgresSessionStore::new(pool.clone(), SessionStoreConfig::from_auth_config(auth))
                .await?,
        );

        let callback = if auth.federation.enabled {
            let client = HttpOAuthClient::new(&auth.federation)?;
            let resolver = IdentityResolver::new(
                users,
                accounts,
                Arc::new(client),
                ResolverConfig::new(auth.federation.provider.as_str())
                    .with_link_by_email(auth.federation.link_by_email),
            )
            .with_call_timeout(auth.storage_timeout);
            tracing::info!(provider = %auth.federation.provider, "Federated login enabled");
            Some(CallbackState {
                resolver: Arc::new(resolver),
                tokens: tokens.clone(),
                sessions: sessions.clone(),
                token_ttl: auth.tokens.authentication_ttl,
                session_ttl: auth.session.session_ttl,
            })
        } else {
            tracing::info!("Federated login disabled; /auth/callback is not mounted");
            None
        };

        let token_purge = spawn_token_purge(tokens.clone(), cfg.server.token_purge_interval);

        let state = AppState {
            auth: AuthState::new(tokens, TokenScope::Authentication),
            pool,
        };

        Ok(KeygateServer {
            addr: cfg.addr(),
            app: build_app(state, callback),
            sessions,
            token_purge,
        })
    }
}

impl KeygateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.token_purge.stop().await;
        // Closing the session store also closes the shared pool.
        self.sessions.close().await?;
        tracing::info!("shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use keygate_auth::storage::memory::{InMemoryDirectory, InMemoryTokenStorage};
    use keygate_auth::types::{NewUser, User};
    use keygate_auth_postgres::pool::PgPoolOptions;
    use tower::ServiceExt;

    async fn setup() -> (Router, Arc<TokenService>, User) {
        let directory = Arc::new(InMemoryDirectory::new());
        let user = directory
            .insert_user(&NewUser {
                email: Some("ada@example.com".to_string()),
                ..NewUser::default()
            })
            .await
            .unwrap();
        let tokens = Arc::new(TokenService::new(
            Arc::new(InMemoryTokenStorage::new()),
            directory,
        ));
        // Nothing listens on port 1; the pool never connects.
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://keygate@127.0.0.1:1/keygate")
            .unwrap();
        let state = AppState {
            auth: AuthState::new(tokens.clone(), TokenScope::Authentication),
            pool: Arc::new(pool),
        };
        (build_app(state, None), tokens, user)
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_me_then_logout() {
        let (app, tokens, user) = setup().await;
        let issued = tokens
            .generate(user.id, Duration::from_secs(300), TokenScope::Authentication)
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(request("GET", "/me", Some(&issued.plaintext)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let me: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(me["id"], user.id);
        assert_eq!(me["email"], "ada@example.com");

        let response = app
            .clone()
            .oneshot(request("POST", "/auth/logout", Some(&issued.plaintext)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request("GET", "/me", Some(&issued.plaintext)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_access_token_cannot_use_login_routes() {
        let (app, tokens, user) = setup().await;
        let issued = tokens
            .generate(user.id, Duration::from_secs(300), TokenScope::Access)
            .await
            .unwrap();

        let response = app
            .oneshot(request("GET", "/me", Some(&issued.plaintext)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_callback_not_mounted_when_federation_disabled() {
        let (app, _, _) = setup().await;
        let response = app
            .oneshot(request("GET", "/auth/callback?code=abc", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_healthz_reports_unreachable_database() {
        let (app, _, _) = setup().await;
        let response = app.oneshot(request("GET", "/healthz", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
