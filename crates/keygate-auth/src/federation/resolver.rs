//! Identity resolution for federated logins.
//!
//! Given a verified external identity, the resolver decides which local user
//! the login belongs to:
//!
//! 1. an account already linked to `(provider, external_id)` wins
//! 2. otherwise a user with the same verified email gets a new linked account
//! 3. otherwise a user and account are created together in one transaction
//!
//! When two first logins for the same identity race, the loser's create fails
//! on the `(provider, provider_account_id)` unique constraint. The resolver
//! then looks the account up once more and returns it as `LinkedExisting`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::client::{ExternalProfile, OAuthClient};
use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{AccountStorage, DEFAULT_CALL_TIMEOUT, UserStorage, bounded};
use crate::types::{Account, NewAccount, NewUser, user::DEFAULT_ACCOUNT_TYPE};

/// Settings for a resolver bound to one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Provider name stored on accounts.
    pub provider: String,
    /// Account type stored on accounts.
    pub account_type: String,
    /// Whether a verified email may link to an existing user.
    pub link_by_email: bool,
}

impl ResolverConfig {
    /// Creates a config for `provider` with email linking enabled.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            account_type: DEFAULT_ACCOUNT_TYPE.to_string(),
            link_by_email: true,
        }
    }

    /// Enables or disables linking by verified email.
    #[must_use]
    pub fn with_link_by_email(mut self, link_by_email: bool) -> Self {
        self.link_by_email = link_by_email;
        self
    }

    fn new_account(&self, external_id: &str) -> NewAccount {
        NewAccount {
            account_type: self.account_type.clone(),
            provider: self.provider.clone(),
            provider_account_id: external_id.to_string(),
        }
    }
}

/// Why a login could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Stored records contradict each other, e.g. an account without a user.
    Integrity(String),
    /// A write needed to complete the login failed.
    Transaction(String),
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrity(detail) => write!(f, "integrity: {detail}"),
            Self::Transaction(detail) => write!(f, "transaction: {detail}"),
        }
    }
}

/// Outcome of resolving a federated login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResolution {
    /// The external identity was already linked.
    LinkedExisting { user_id: i64, account_id: i64 },
    /// A new account was linked to a user found by verified email.
    LinkedByEmail { user_id: i64, account_id: i64 },
    /// A new user and account were created.
    CreatedNew { user_id: i64, account_id: i64 },
    /// The login could not be resolved. The reason is for logs only.
    Conflict { reason: ConflictReason },
}

impl IdentityResolution {
    /// Returns the resolved user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::LinkedExisting { user_id, .. }
            | Self::LinkedByEmail { user_id, .. }
            | Self::CreatedNew { user_id, .. } => Some(*user_id),
            Self::Conflict { .. } => None,
        }
    }

    /// Returns the resolved account, if any.
    #[must_use]
    pub fn account_id(&self) -> Option<i64> {
        match self {
            Self::LinkedExisting { account_id, .. }
            | Self::LinkedByEmail { account_id, .. }
            | Self::CreatedNew { account_id, .. } => Some(*account_id),
            Self::Conflict { .. } => None,
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stable outcome name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedExisting { .. } => "linked_existing",
            Self::LinkedByEmail { .. } => "linked_by_email",
            Self::CreatedNew { .. } => "created_new",
            Self::Conflict { .. } => "conflict",
        }
    }

    fn integrity(detail: impl Into<String>) -> Self {
        Self::Conflict {
            reason: ConflictReason::Integrity(detail.into()),
        }
    }

    fn transaction(detail: impl Into<String>) -> Self {
        Self::Conflict {
            reason: ConflictReason::Transaction(detail.into()),
        }
    }
}

impl fmt::Display for IdentityResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciles external identities with local users and accounts.
pub struct IdentityResolver {
    users: Arc<dyn UserStorage>,
    accounts: Arc<dyn AccountStorage>,
    client: Arc<dyn OAuthClient>,
    config: ResolverConfig,
    call_timeout: Duration,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStorage>,
        accounts: Arc<dyn AccountStorage>,
        client: Arc<dyn OAuthClient>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            users,
            accounts,
            client,
            config,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the upper bound for each storage call.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Runs the whole callback flow for an authorization code.
    ///
    /// # Errors
    ///
    /// `IdentityProvider` when the exchange or profile fetch fails,
    /// `Transient` when storage times out. Every other failure is reported
    /// as [`IdentityResolution::Conflict`].
    pub async fn resolve_callback(&self, code: &str) -> AuthResult<IdentityResolution> {
        if code.is_empty() {
            return Err(AuthError::validation("authorization code is empty"));
        }
        let token = self.client.exchange_code(code).await?;
        let profile = self.client.fetch_profile(&token).await?;
        self.resolve(&profile).await
    }

    /// Resolves an already fetched profile.
    pub async fn resolve(&self, profile: &ExternalProfile) -> AuthResult<IdentityResolution> {
        if profile.external_id.is_empty() {
            return Err(AuthError::validation("external identity has no subject"));
        }

        if let Some(resolution) = self.match_provider(profile).await? {
            return Ok(resolution);
        }

        if self.config.link_by_email
            && let Some(email) = profile.verified_email()
            && let Some(resolution) = self.match_email(profile, email).await?
        {
            return Ok(resolution);
        }

        self.create(profile).await
    }

    async fn match_provider(
        &self,
        profile: &ExternalProfile,
    ) -> AuthResult<Option<IdentityResolution>> {
        let found = bounded(
            self.call_timeout,
            "account lookup",
            self.accounts
                .find_by_provider(&self.config.provider, &profile.external_id),
        )
        .await;

        let account = match found {
            Ok(Some(account)) => account,
            Ok(None) => return Ok(None),
            Err(e) => return self.lookup_failed("account lookup", e).map(Some),
        };

        self.linked_existing(account).await.map(Some)
    }

    async fn linked_existing(&self, account: Account) -> AuthResult<IdentityResolution> {
        let user = bounded(
            self.call_timeout,
            "user lookup",
            self.users.find_by_id(account.user_id),
        )
        .await;

        match user {
            Ok(Some(user)) => {
                debug!(user_id = user.id, account_id = account.id, "Login matched linked account");
                Ok(IdentityResolution::LinkedExisting {
                    user_id: user.id,
                    account_id: account.id,
                })
            }
            Ok(None) => {
                warn!(
                    account_id = account.id,
                    user_id = account.user_id,
                    provider = %account.provider,
                    "Linked account references a missing user"
                );
                Ok(IdentityResolution::integrity(format!(
                    "account {} references missing user {}",
                    account.id, account.user_id
                )))
            }
            Err(e) => self.lookup_failed("user lookup", e),
        }
    }

    async fn match_email(
        &self,
        profile: &ExternalProfile,
        email: &str,
    ) -> AuthResult<Option<IdentityResolution>> {
        let found = bounded(
            self.call_timeout,
            "user email lookup",
            self.users.find_by_email(email),
        )
        .await;

        let user = match found {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(None),
            Err(e) => return self.lookup_failed("user email lookup", e).map(Some),
        };

        let account = self.config.new_account(&profile.external_id);
        let created = bounded(
            self.call_timeout,
            "account link",
            self.accounts.create(user.id, &account),
        )
        .await;

        match created {
            Ok(account) => {
                info!(user_id = user.id, account_id = account.id, provider = %self.config.provider, "Linked account by verified email");
                Ok(Some(IdentityResolution::LinkedByEmail {
                    user_id: user.id,
                    account_id: account.id,
                }))
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Failed to link account by email");
                Ok(Some(IdentityResolution::transaction(format!(
                    "linking account to user {}: {e}",
                    user.id
                ))))
            }
        }
    }

    async fn create(&self, profile: &ExternalProfile) -> AuthResult<IdentityResolution> {
        let user = NewUser {
            email: profile.verified_email().map(str::to_string),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        };
        let account = self.config.new_account(&profile.external_id);

        let created = bounded(
            self.call_timeout,
            "user and account create",
            self.accounts.create_with_user(&user, &account),
        )
        .await;

        match created {
            Ok((user, account)) => {
                info!(user_id = user.id, account_id = account.id, provider = %self.config.provider, "Created user from federated login");
                Ok(IdentityResolution::CreatedNew {
                    user_id: user.id,
                    account_id: account.id,
                })
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) if e.is_conflict() => self.recheck_after_conflict(profile, e).await,
            Err(e) => {
                warn!(error = %e, "Failed to create user and account");
                Ok(IdentityResolution::transaction(e.to_string()))
            }
        }
    }

    /// Re-runs the provider match once after a write hit a unique constraint.
    ///
    /// A concurrent login for the same identity that committed first makes
    /// the account visible here.
    async fn recheck_after_conflict(
        &self,
        profile: &ExternalProfile,
        conflict: AuthError,
    ) -> AuthResult<IdentityResolution> {
        debug!(error = %conflict, "Write lost a race, re-checking linked account");
        let retry = bounded(
            self.call_timeout,
            "account lookup",
            self.accounts
                .find_by_provider(&self.config.provider, &profile.external_id),
        )
        .await;

        match retry {
            Ok(Some(account)) => self.linked_existing(account).await,
            Ok(None) => {
                warn!(error = %conflict, "Write conflicted but no linked account exists");
                Ok(IdentityResolution::transaction(conflict.to_string()))
            }
            Err(e) => self.lookup_failed("account lookup", e),
        }
    }

    fn lookup_failed(&self, operation: &str, error: AuthError) -> AuthResult<IdentityResolution> {
        if error.is_transient() {
            return Err(error);
        }
        warn!(operation, error = %error, "Identity lookup failed");
        Ok(IdentityResolution::transaction(format!("{operation}: {error}")))
    }
}
