//! Keygate HTTP server.
//!
//! Wires the PostgreSQL storage backend into the `keygate-auth` handlers and
//! runs them behind axum with request tracing and graceful shutdown.

pub mod config;
pub mod observability;
pub mod server;

pub use server::{AppState, KeygateServer, ServerBuilder, build_app};
