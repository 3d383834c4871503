//! Locating and starting the index service

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Executable name of the index service
pub const SERVICE_BINARY: &str = "nixnav-daemon";

/// How long to wait for a freshly launched service to accept connections
pub const STARTUP_WAIT: Duration = Duration::from_secs(5);

const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Find the service executable.
///
/// Order: explicit override, `~/.nix-profile/bin`, the NixOS system profile, then `$PATH`.
pub fn find_service_binary(override_path: Option<&Path>) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(path) = override_path {
        candidates.push(path.to_path_buf());
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".nix-profile").join("bin").join(SERVICE_BINARY));
    }
    candidates.push(PathBuf::from("/run/current-system/sw/bin").join(SERVICE_BINARY));
    if let Some(path_var) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&path_var).map(|dir| dir.join(SERVICE_BINARY)));
    }

    candidates.into_iter().find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Start the service detached and wait until its socket accepts connections.
///
/// A socket file that refuses connections is left over from a dead service and is removed
/// first. Returns false if no executable was found or the socket never came up.
pub fn launch_service(socket_path: &Path, override_path: Option<&Path>) -> bool {
    if socket_path.exists() {
        if UnixStream::connect(socket_path).is_ok() {
            return true;
        }
        debug!(socket = %socket_path.display(), "removing stale service socket");
        let _ = fs::remove_file(socket_path);
    }

    let Some(binary) = find_service_binary(override_path) else {
        warn!("index service executable {} not found", SERVICE_BINARY);
        return false;
    };

    // Own process group: the service outlives this process and ignores its terminal signals
    let spawned = Command::new(&binary)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn();

    match spawned {
        Ok(child) => info!(pid = child.id(), binary = %binary.display(), "launched index service"),
        Err(e) => {
            warn!(binary = %binary.display(), error = %e, "failed to launch index service");
            return false;
        }
    }

    wait_for_socket(socket_path, STARTUP_WAIT)
}

/// Poll until the socket accepts a connection or `limit` elapses
pub fn wait_for_socket(socket_path: &Path, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if socket_path.exists() && UnixStream::connect(socket_path).is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            warn!(socket = %socket_path.display(), "index service did not come up in time");
            return false;
        }
        thread::sleep(STARTUP_POLL);
    }
}
