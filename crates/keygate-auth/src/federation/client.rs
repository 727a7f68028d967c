//! OAuth client for the authorization code exchange.
//!
//! The server never sees the user's provider credentials. It receives an
//! authorization code on the callback, exchanges it for a provider access
//! token at the token endpoint, then reads the user's profile from the
//! userinfo endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::AuthResult;
use crate::config::FederationConfig;
use crate::error::AuthError;

/// Provider access token obtained from the code exchange.
#[derive(Clone)]
pub struct FederatedToken {
    pub access_token: String,
}

impl fmt::Debug for FederatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedToken")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Identity asserted by the external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    /// Provider-assigned subject identifier.
    pub external_id: String,
    pub email: Option<String>,
    /// Whether the provider vouches for `email`.
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ExternalProfile {
    /// Returns the email only if the provider verified it.
    #[must_use]
    pub fn verified_email(&self) -> Option<&str> {
        if self.email_verified {
            self.email.as_deref().filter(|e| !e.is_empty())
        } else {
            None
        }
    }

    /// Builds a profile from standard OIDC userinfo claims.
    ///
    /// `sub` is required; a string or numeric `id` is accepted in its place.
    pub fn from_claims(provider: &str, claims: &Value) -> AuthResult<Self> {
        let external_id = match (claims.get("sub"), claims.get("id")) {
            (Some(Value::String(sub)), _) if !sub.is_empty() => sub.clone(),
            (_, Some(Value::String(id))) if !id.is_empty() => id.clone(),
            (_, Some(Value::Number(id))) => id.to_string(),
            _ => {
                return Err(AuthError::identity_provider(
                    provider,
                    "userinfo response has no subject identifier",
                ));
            }
        };

        let string_claim = |name: &str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            external_id,
            email: string_claim("email"),
            email_verified: claims
                .get("email_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            display_name: string_claim("name").or_else(|| string_claim("login")),
            avatar_url: string_claim("picture").or_else(|| string_claim("avatar_url")),
        })
    }
}

/// Client side of an OAuth 2.0 authorization code flow.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Exchanges an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> AuthResult<FederatedToken>;

    /// Fetches the profile of the user the token belongs to.
    async fn fetch_profile(&self, token: &FederatedToken) -> AuthResult<ExternalProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`OAuthClient`] talking to a provider over HTTP.
#[derive(Clone)]
pub struct HttpOAuthClient {
    provider: String,
    client_id: String,
    client_secret: String,
    token_url: Url,
    userinfo_url: Url,
    redirect_uri: Option<String>,
    http: reqwest::Client,
}

impl HttpOAuthClient {
    /// Default timeout for provider requests.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client from federation configuration.
    pub fn new(config: &FederationConfig) -> AuthResult<Self> {
        let parse = |field: &str, value: &str| {
            Url::parse(value).map_err(|e| {
                AuthError::configuration(format!("federation.{field} is not a valid URL: {e}"))
            })
        };

        let http = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            provider: config.provider.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: parse("token_url", &config.token_url)?,
            userinfo_url: parse("userinfo_url", &config.userinfo_url)?,
            redirect_uri: config.redirect_uri.clone(),
            http,
        })
    }

    /// Returns the provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn provider_error(&self, message: impl Into<String>) -> AuthError {
        AuthError::identity_provider(&self.provider, message)
    }
}

impl fmt::Debug for HttpOAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOAuthClient")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    async fn exchange_code(&self, code: &str) -> AuthResult<FederatedToken> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            params.push(("redirect_uri", redirect_uri.as_str()));
        }

        tracing::debug!(provider = %self.provider, endpoint = %self.token_url, "Exchanging authorization code");

        let response = self
            .http
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(self.provider_error(format!(
                    "token endpoint returned {}: {}",
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default()
                )));
            }
            return Err(self.provider_error(format!("token endpoint returned HTTP {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.provider_error(format!("invalid token response: {e}")))?;

        if token.access_token.is_empty() {
            return Err(self.provider_error("token response has an empty access_token"));
        }

        Ok(FederatedToken {
            access_token: token.access_token,
        })
    }

    async fn fetch_profile(&self, token: &FederatedToken) -> AuthResult<ExternalProfile> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(self.provider_error(format!(
                "userinfo endpoint returned HTTP {}",
                response.status()
            )));
        }

        let claims: Value = response
            .json()
            .await
            .map_err(|e| self.provider_error(format!("invalid userinfo response: {e}")))?;

        ExternalProfile::from_claims(&self.provider, &claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> FederationConfig {
        FederationConfig {
            enabled: true,
            provider: "example".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            token_url: format!("{}/oauth/token", server.uri()),
            userinfo_url: format!("{}/userinfo", server.uri()),
            redirect_uri: Some("http://localhost/auth/callback".to_string()),
            link_by_email: true,
        }
    }

    #[test]
    fn test_profile_from_oidc_claims() {
        let claims = json!({
            "sub": "abc",
            "email": "ada@example.com",
            "email_verified": true,
            "name": "Ada",
            "picture": "https://img.example.com/ada.png"
        });
        let profile = ExternalProfile::from_claims("example", &claims).unwrap();

        assert_eq!(profile.external_id, "abc");
        assert_eq!(profile.verified_email(), Some("ada@example.com"));
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://img.example.com/ada.png")
        );
    }

    #[test]
    fn test_profile_numeric_id_fallback() {
        let claims = json!({ "id": 12345, "login": "octocat", "email": "o@example.com" });
        let profile = ExternalProfile::from_claims("github", &claims).unwrap();

        assert_eq!(profile.external_id, "12345");
        assert_eq!(profile.display_name.as_deref(), Some("octocat"));
        assert!(!profile.email_verified);
        assert_eq!(profile.verified_email(), None);
    }

    #[test]
    fn test_profile_without_subject_is_rejected() {
        let err = ExternalProfile::from_claims("example", &json!({ "email": "x@example.com" }))
            .unwrap_err();
        assert!(matches!(err, AuthError::IdentityProvider { .. }));
    }

    #[tokio::test]
    async fn test_exchange_and_fetch_profile() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "provider-token",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer provider-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "user-7",
                "email": "grace@example.com",
                "email_verified": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpOAuthClient::new(&config_for(&server)).unwrap();
        let token = client.exchange_code("the-code").await.unwrap();
        let profile = client.fetch_profile(&token).await.unwrap();

        assert_eq!(profile.external_id, "user-7");
        assert_eq!(profile.verified_email(), Some("grace@example.com"));
    }

    #[tokio::test]
    async fn test_exchange_error_maps_to_identity_provider() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .mount(&server)
            .await;

        let client = HttpOAuthClient::new(&config_for(&server)).unwrap();
        let err = client.exchange_code("stale").await.unwrap_err();

        match err {
            AuthError::IdentityProvider { provider, message } => {
                assert_eq!(provider, "example");
                assert!(message.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_userinfo_failure_maps_to_identity_provider() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpOAuthClient::new(&config_for(&server)).unwrap();
        let token = FederatedToken {
            access_token: "t".to_string(),
        };
        let err = client.fetch_profile(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::IdentityProvider { .. }));
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let config = FederationConfig {
            token_url: "not a url".to_string(),
            ..FederationConfig::default()
        };
        let err = HttpOAuthClient::new(&config).unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[test]
    fn test_client_debug_redacts_secret() {
        let config = FederationConfig {
            client_id: "kg-client".to_string(),
            client_secret: "hunter2".to_string(),
            token_url: "https://idp.example.com/token".to_string(),
            userinfo_url: "https://idp.example.com/userinfo".to_string(),
            ..FederationConfig::default()
        };
        let client = HttpOAuthClient::new(&config).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("kg-client"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_federated_token_debug_redacts() {
        let token = FederatedToken {
            access_token: "super-secret".to_string(),
        };
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
