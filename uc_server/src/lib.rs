//! HTTP/WebSocket server hosting uncooperative games.
//!
//! Games live in [`uncooperative::room::GameManager`] actors; this crate adds
//! the REST and WebSocket surface, configuration, logging and metrics.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
