//! Room coordination core for a festival kiosk backend.
//!
//! Coordinates small groups of ephemeral WebSocket clients through named
//! rooms: a presence quorum that schedules a session start, a readiness
//! quorum with a timeout fallback that places downstream orders, and a
//! streaming bridge onto a sliding-window numeric aggregator.

pub mod aggregator;
pub mod collaborator;
pub mod registry;
pub mod server;

// shared library
pub mod common;
