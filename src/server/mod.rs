//! Index service client
//!
//! The index service (`nixnav-daemon`) keeps a trigram index of every bookmarked
//! root and answers name searches over a Unix socket.
//!
//! Architecture:
//! - [`IndexClient`]: lazy connection, one command at a time, per-command timeouts
//! - [`launcher`]: finds and starts the service the first time it is needed
//! - Fallback: if the service is unavailable the caller scans with external tools
//!   (see [`crate::scan::fallback`])

mod client;
pub mod launcher;
pub mod protocol;

pub use client::{spawn_bookmark_sync, ClientError, ClientResult, IndexClient, SearchReply, ServiceStats};

use std::path::PathBuf;

/// Socket file name of the index service
pub const SERVICE_SOCKET_NAME: &str = "nixnav-daemon.sock";

/// Socket file name of the single-instance gateway
pub const INSTANCE_SOCKET_NAME: &str = "nixnav.sock";

/// Per-user runtime directory (tmpfs-backed, user-only)
pub fn runtime_dir() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR")
        && !runtime_dir.is_empty()
    {
        return PathBuf::from(runtime_dir);
    }

    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/run/user/{}", uid))
}

/// Get the socket path for the index service
pub fn get_socket_path() -> PathBuf {
    runtime_dir().join(SERVICE_SOCKET_NAME)
}

/// Get the socket path used to reach an already running UI instance
pub fn get_instance_socket_path() -> PathBuf {
    runtime_dir().join(INSTANCE_SOCKET_NAME)
}
