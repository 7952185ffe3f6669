//! Local dashboard server.
//!
//! Serves the latest snapshot at `GET /data` and the dashboard's static
//! assets from a public directory for every other path.

mod server;

use std::path::PathBuf;

pub use server::{router, serve, shutdown_signal};

/// Where the server listens and what it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Snapshot file returned by `/data`, re-read on every request
    pub snapshot_path: PathBuf,
    /// Directory of static dashboard assets
    pub public_dir: PathBuf,
}
