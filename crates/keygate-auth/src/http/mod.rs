//! Axum HTTP handlers.
//!
//! # Available Handlers
//!
//! - [`callback_handler`] - OAuth callback: resolve identity, mint a login token
//! - [`me_handler`] - Returns the authenticated user
//! - [`logout_handler`] - Revokes the user's login tokens

pub mod callback;
pub mod user;

pub use callback::{CallbackParams, CallbackResponse, CallbackState, SessionPayload, callback_handler};
pub use user::{logout_handler, me_handler};
