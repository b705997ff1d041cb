//! WebSocket room coordination server.

pub mod bridge;
pub mod client;
pub mod confirm;
pub mod runner;
pub mod signal;
pub mod state;
pub mod stay;

pub use runner::{router, run_server};
