//! Common types used across the authentication modules.
//!
//! ## Domain Types
//!
//! - [`TokenScope`] - Purpose an opaque token was issued for
//! - [`TokenRecord`] - Persisted form of a token (hash only)
//! - [`IssuedToken`] - Freshly minted token including its plaintext
//! - [`User`] / [`Account`] - Local identity records

pub mod token;
pub mod user;

pub use token::{IssuedToken, TokenRecord, TokenScope};
pub use user::{Account, NewAccount, NewUser, User};
