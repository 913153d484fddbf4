//! # skillswap-server
//!
//! HTTP and WebSocket front end of the skillswap engine.
//!
//! - `GET /ws` - realtime events (JSON text or length-prefixed MessagePack binary)
//! - `/api/...` - match, message and presence requests
//! - `GET /health` - liveness and connection counts

pub mod api;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod state;

pub use config::Config;
pub use handlers::{build_app, run_server, serve};
pub use state::AppState;
