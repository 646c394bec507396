//! # switchboard-server
//!
//! The Switchboard relay server: axum WebSocket listener, configuration,
//! and metrics. The binary entry point lives in `main.rs`; the pieces are
//! exported here so integration tests and embedding applications can build
//! the router themselves (e.g. to mount collaborator routes on the same
//! listener).

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app_router, run_server, AppState};
