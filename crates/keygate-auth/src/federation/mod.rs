//! External identity provider federation.
//!
//! This module provides:
//!
//! - [`OAuthClient`] - authorization code exchange and profile fetch
//! - [`HttpOAuthClient`] - `reqwest` implementation against a provider's
//!   token and userinfo endpoints
//! - [`IdentityResolver`] - reconciles an external profile with local users
//!   and accounts

pub mod client;
pub mod resolver;

pub use client::{ExternalProfile, FederatedToken, HttpOAuthClient, OAuthClient};
pub use resolver::{ConflictReason, IdentityResolution, IdentityResolver, ResolverConfig};
