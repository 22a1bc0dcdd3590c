//! Weather bulletin service.
//!
//! Runs the alerts and current-conditions feeds and serves them over HTTP:
//! polling snapshots, server-sent event streams, a notification push
//! endpoint and a station reload endpoint.

pub mod config;
pub mod server;
pub mod state;
pub mod stream;
