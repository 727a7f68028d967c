//! Authentication configuration.
//!
//! Durations are written in humantime form (`"3s"`, `"24h"`, `"90days"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! storage_timeout = "3s"
//!
//! [auth.session]
//! gc_interval = "10s"
//! session_ttl = "24h"
//! table = "sessions"
//!
//! [auth.tokens]
//! authentication_ttl = "24h"
//! access_ttl = "90days"
//!
//! [auth.federation]
//! enabled = true
//! provider = "github"
//! client_id = "..."
//! client_secret = "..."
//! token_url = "https://github.com/login/oauth/access_token"
//! userinfo_url = "https://api.github.com/user"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Upper bound for every individual storage call.
    #[serde(with = "humantime_serde")]
    pub storage_timeout: Duration,

    /// Expiring session store settings.
    pub session: SessionConfig,

    /// Token lifetimes.
    pub tokens: TokenConfig,

    /// OAuth provider settings.
    pub federation: FederationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(3),
            session: SessionConfig::default(),
            tokens: TokenConfig::default(),
            federation: FederationConfig::default(),
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between collector passes.
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,

    /// Lifetime of the session entry written on login.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Table holding session entries.
    pub table: String,

    /// Clear all sessions when the store starts.
    pub reset_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gc_interval: Duration::from_secs(10),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            table: "sessions".to_string(),
            reset_on_start: false,
        }
    }
}

/// Token lifetimes per scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of tokens minted on login.
    #[serde(with = "humantime_serde")]
    pub authentication_ttl: Duration,

    /// Lifetime of API access tokens.
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            authentication_ttl: Duration::from_secs(24 * 60 * 60),
            access_ttl: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

/// OAuth provider settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Mount the OAuth callback route.
    pub enabled: bool,

    /// Provider name stored on linked accounts.
    pub provider: String,

    pub client_id: String,

    pub client_secret: String,

    /// Token endpoint for the authorization code exchange.
    pub token_url: String,

    /// Endpoint returning the user's profile claims.
    pub userinfo_url: String,

    /// Redirect URI sent with the code exchange, if the provider requires it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Link a login to an existing user with the same verified email.
    pub link_by_email: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            token_url: String::new(),
            userinfo_url: String::new(),
            redirect_uri: None,
            link_by_email: true,
        }
    }
}

impl std::fmt::Debug for FederationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("link_by_email", &self.link_by_email)
            .finish()
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// Returns `true` if `name` is a plain SQL identifier.
#[must_use]
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - a timeout, interval or lifetime is zero
    /// - the session table is not a plain identifier
    /// - federation is enabled with an unparseable endpoint URL
    ///
    /// Returns `ConfigError::Missing` if federation is enabled without a
    /// provider name, client id or endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("storage_timeout", self.storage_timeout),
            ("session.gc_interval", self.session.gc_interval),
            ("session.session_ttl", self.session.session_ttl),
            ("tokens.authentication_ttl", self.tokens.authentication_ttl),
            ("tokens.access_ttl", self.tokens.access_ttl),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if !is_valid_table_name(&self.session.table) {
            return Err(ConfigError::InvalidValue(format!(
                "session.table '{}' is not a valid table name",
                self.session.table
            )));
        }

        if self.federation.enabled {
            self.federation.validate()?;
        }

        Ok(())
    }
}

impl FederationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("federation.provider", &self.provider),
            ("federation.client_id", &self.client_id),
            ("federation.token_url", &self.token_url),
            ("federation.userinfo_url", &self.userinfo_url),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Missing(name.to_string()));
            }
        }

        for (name, value) in [
            ("federation.token_url", &self.token_url),
            ("federation.userinfo_url", &self.userinfo_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::InvalidValue(format!("{name}: {e}")))?;
        }

        Ok(())
    }
}
