//! Opaque bearer token generation, validation, and revocation.
//!
//! Tokens are 26 characters of the RFC 4648 base32 alphabet (130 bits of
//! entropy). Only their SHA-256 digest is stored.

pub mod service;

pub use service::{TOKEN_ALPHABET, TOKEN_LEN, TokenService, hash_token, is_well_formed};
