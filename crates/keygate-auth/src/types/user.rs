//! Local user and linked account records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Account type recorded for accounts created through OAuth federation.
pub const DEFAULT_ACCOUNT_TYPE: &str = "oauth";

/// A local user.
///
/// `email` is only ever populated from a provider-verified address and is
/// unique across users when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row id.
    pub id: i64,

    /// Public identifier.
    pub uuid: Uuid,

    /// Verified email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Optimistic concurrency counter, incremented on every update.
    pub version: i32,
}

/// Fields for a user that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// An external identity linked to exactly one local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Row id.
    pub id: i64,

    /// Public identifier.
    pub uuid: Uuid,

    /// Owning user's row id.
    pub user_id: i64,

    /// Account type, `"oauth"` for federated logins.
    #[serde(rename = "type")]
    pub account_type: String,

    /// Provider name, e.g. `"github"`.
    pub provider: String,

    /// Subject identifier assigned by the provider.
    pub provider_account_id: String,

    /// When the account was linked.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Optimistic concurrency counter.
    pub version: i32,
}

/// Fields for an account that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub account_type: String,
    pub provider: String,
    pub provider_account_id: String,
}

impl NewAccount {
    /// Creates an OAuth account for `provider` / `provider_account_id`.
    pub fn oauth(provider: impl Into<String>, provider_account_id: impl Into<String>) -> Self {
        Self {
            account_type: DEFAULT_ACCOUNT_TYPE.to_string(),
            provider: provider.into(),
            provider_account_id: provider_account_id.into(),
        }
    }
}
