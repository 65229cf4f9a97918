//! Server assembly
//!
//! Configuration loading, the shared application state, and startup wiring
//! for the Axum HTTP server.
//!
//! Startup flow: load `ServerConfig` from the environment, create the
//! storage directory, open the broadcast channel, spawn the polling
//! fallback, then hand the assembled state to the router.

/// Application state and `FromRef` implementations
pub mod state;

/// Configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::ServerConfig;
pub use init::create_app;
pub use state::AppState;
