//! Single-instance gateway
//!
//! The first process binds `nixnav.sock` and becomes the primary instance. Later
//! launches connect, write `toggle`, and exit; the primary picks the message up
//! from its event loop via [`InstanceListener::poll_toggle`].

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The only message the gateway understands
pub const TOGGLE_MESSAGE: &str = "toggle";

/// Longest message read from a connection
const MAX_MESSAGE_BYTES: u64 = 64;

/// How long a connection may take to deliver its message before it is dropped
const MESSAGE_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to remove stale socket {}: {source}", path.display())]
    StaleSocket { path: PathBuf, source: io::Error },
    #[error("failed to listen on {}: {source}", path.display())]
    Bind { path: PathBuf, source: io::Error },
    #[error("failed to signal running instance: {0}")]
    Forward(io::Error),
}

/// Outcome of [`acquire`]
#[derive(Debug)]
pub enum Acquired {
    /// No other instance was running; this process now owns the socket
    Primary(InstanceListener),
    /// Another instance is running and has been sent `toggle`
    Forwarded,
}

/// Become the primary instance, or signal the one already running
pub fn acquire(path: &Path) -> Result<Acquired, GatewayError> {
    if let Ok(mut stream) = UnixStream::connect(path) {
        stream
            .write_all(TOGGLE_MESSAGE.as_bytes())
            .map_err(GatewayError::Forward)?;
        debug!(socket = %path.display(), "forwarded toggle to running instance");
        return Ok(Acquired::Forwarded);
    }

    InstanceListener::bind(path).map(Acquired::Primary)
}

/// Listening side of the gateway. Removes its socket file when dropped.
#[derive(Debug)]
pub struct InstanceListener {
    listener: UnixListener,
    path: PathBuf,
    pending: Vec<PendingMessage>,
}

/// An accepted connection whose message has not fully arrived
#[derive(Debug)]
struct PendingMessage {
    stream: UnixStream,
    buf: Vec<u8>,
    accepted: Instant,
}

enum ReadState {
    /// Sender closed the connection; `buf` holds the whole message
    Complete,
    /// More bytes may still come
    Waiting,
    Failed,
}

impl PendingMessage {
    /// Read whatever has arrived without blocking
    fn read_available(&mut self) -> ReadState {
        let mut chunk = [0u8; MAX_MESSAGE_BYTES as usize];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return ReadState::Complete,
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if self.buf.len() as u64 > MAX_MESSAGE_BYTES {
                        debug!("dropping oversized instance message");
                        return ReadState::Failed;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadState::Waiting,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(error = %e, "dropping instance message");
                    return ReadState::Failed;
                }
            }
        }
    }

    fn message(&self) -> String {
        String::from_utf8_lossy(&self.buf).trim().to_string()
    }
}

impl InstanceListener {
    /// Bind the gateway socket, replacing a stale socket file left by a dead instance
    pub fn bind(path: &Path) -> Result<Self, GatewayError> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        if fs::symlink_metadata(path).is_ok() {
            warn!(socket = %path.display(), "removing stale instance socket");
            fs::remove_file(path).map_err(|source| GatewayError::StaleSocket {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let bind_err = |source: io::Error| GatewayError::Bind {
            path: path.to_path_buf(),
            source,
        };
        let listener = UnixListener::bind(path).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;

        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }

        info!(socket = %path.display(), "listening for instance toggles");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept new connections and read what has arrived, never blocking.
    /// Returns how many complete `toggle` messages were received.
    pub fn poll_toggle(&mut self) -> usize {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    // Accepted sockets do not inherit the listener's non-blocking flag
                    if let Err(e) = stream.set_nonblocking(true) {
                        debug!(error = %e, "dropping instance connection");
                        continue;
                    }
                    self.pending.push(PendingMessage {
                        stream,
                        buf: Vec::new(),
                        accepted: Instant::now(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "instance socket accept failed");
                    break;
                }
            }
        }

        let mut toggles = 0;
        self.pending.retain_mut(|pending| match pending.read_available() {
            ReadState::Complete => {
                let message = pending.message();
                if message == TOGGLE_MESSAGE {
                    toggles += 1;
                } else {
                    debug!(message = %message, "ignoring unknown instance message");
                }
                false
            }
            ReadState::Waiting if pending.accepted.elapsed() < MESSAGE_DEADLINE => true,
            ReadState::Waiting => {
                debug!("dropping incomplete instance message");
                false
            }
            ReadState::Failed => false,
        });

        toggles
    }

    /// Connections accepted but not yet complete
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for InstanceListener {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
