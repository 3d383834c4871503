//! Client for the index service

use crate::scan::{CancelToken, EntryKind, ResultEntry};
use crate::server::launcher::launch_service;
use crate::server::protocol::{
    resume_message, write_message, BookmarkPayload, Command, SearchAllPayload, SearchPayload,
    SearchResponse, StatsResponse, StatusResponse, WireEntry, DEFAULT_TIMEOUT,
};
use crate::utils::Bookmark;
use serde::de::DeserializeOwned;
use std::io::{self, BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest a cancelled call keeps blocking on the socket or the connection lock
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in client operations.
///
/// None of these are fatal to a search: callers fall back to scanning with external tools.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket missing, connection refused, or the service failed to start
    #[error("index service is not available")]
    Unavailable,
    /// The service did not answer within the command's timeout
    #[error("index service timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// Malformed or truncated response
    #[error("invalid response from index service: {0}")]
    Protocol(String),
    /// The service answered with an `error` field
    #[error("index service error: {0}")]
    Server(String),
    /// The caller's search was superseded before the service answered
    #[error("index service call cancelled")]
    Cancelled,
}

impl ClientError {
    fn from_io(e: io::Error, timeout: Duration) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout(timeout),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                ClientError::Protocol(e.to_string())
            }
            _ => ClientError::Io(e),
        }
    }
}

/// Search results from the service
#[derive(Debug, Clone, Default)]
pub struct SearchReply {
    pub entries: Vec<ResultEntry>,
    pub total_indexed: u64,
    pub elapsed_ms: u64,
}

/// Service counters as reported by `STATS`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub file_count: u64,
    pub term_count: u64,
    pub bookmark_count: u64,
    pub connected: bool,
}

/// An established socket connection
struct Connection {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
}

impl Connection {
    fn open(socket_path: &Path) -> io::Result<Self> {
        let stream = UnixStream::connect(socket_path)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self { reader, writer })
    }

    /// Send one command and read its single-line response.
    ///
    /// The read runs in short slices so a cancelled call gives up the socket
    /// without waiting out the whole timeout.
    fn exchange(&mut self, command: &Command, timeout: Duration, cancel: Option<&CancelToken>) -> ClientResult<String> {
        let slice = timeout.min(CANCEL_POLL).max(Duration::from_millis(1));
        let stream = self.writer.get_ref();
        // Socket options are shared by both halves of the cloned stream
        stream
            .set_read_timeout(Some(slice))
            .and_then(|_| stream.set_write_timeout(Some(timeout.max(slice))))
            .map_err(ClientError::Io)?;

        write_message(&mut self.writer, command).map_err(|e| ClientError::from_io(e, timeout))?;

        let deadline = Instant::now() + timeout;
        let mut buf = Vec::new();
        loop {
            match resume_message(&mut self.reader, &mut buf) {
                Ok(line) => return Ok(line),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    if cancel.is_some_and(CancelToken::is_cancelled) {
                        return Err(ClientError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        return Err(ClientError::Timeout(timeout));
                    }
                }
                Err(e) => return Err(ClientError::from_io(e, timeout)),
            }
        }
    }
}

/// Client for the index service.
///
/// Holds at most one connection, opened on first use and dropped on any error.
/// All calls take the connection lock for the whole request, so a worker can never
/// read from a socket another worker is tearing down.
pub struct IndexClient {
    socket_path: PathBuf,
    autostart: bool,
    service_command: Option<PathBuf>,
    launch_attempted: AtomicBool,
    default_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl IndexClient {
    /// Client that launches the service on first use if it is not running
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            autostart: true,
            service_command: None,
            launch_attempted: AtomicBool::new(false),
            default_timeout: DEFAULT_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    /// Timeout for `PING`, `SEARCH`, `SEARCH_ALL` and `STATS`.
    /// `ADD_BOOKMARK` and `RESCAN` keep their own longer limits.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Enable or disable launching the service when it is not reachable
    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Use a specific service executable instead of searching for one
    pub fn with_service_command(mut self, command: Option<PathBuf>) -> Self {
        self.service_command = command;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Drop the connection; the next call reconnects
    pub fn disconnect(&self) {
        if let Ok(mut conn) = self.conn.lock() {
            *conn = None;
        }
    }

    fn connect(&self) -> ClientResult<Connection> {
        match Connection::open(&self.socket_path) {
            Ok(conn) => return Ok(conn),
            Err(e) => debug!(socket = %self.socket_path.display(), error = %e, "index service not reachable"),
        }

        // One launch attempt per client lifetime
        if !self.autostart || self.launch_attempted.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Unavailable);
        }

        if !launch_service(&self.socket_path, self.service_command.as_deref()) {
            return Err(ClientError::Unavailable);
        }

        Connection::open(&self.socket_path).map_err(|_| ClientError::Unavailable)
    }

    fn timeout_for(&self, command: &Command) -> Duration {
        match command {
            Command::AddBookmark(_) | Command::Rescan(_) => command.timeout(),
            _ => self.default_timeout,
        }
    }

    /// Take the connection lock. With a token, waiting gives up as soon as it is cancelled.
    fn lock_connection(&self, cancel: Option<&CancelToken>) -> ClientResult<MutexGuard<'_, Option<Connection>>> {
        let poisoned = || ClientError::Protocol("connection lock poisoned".to_string());

        let Some(cancel) = cancel else {
            return self.conn.lock().map_err(|_| poisoned());
        };
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            match self.conn.try_lock() {
                Ok(guard) if cancel.is_cancelled() => {
                    drop(guard);
                    return Err(ClientError::Cancelled);
                }
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => thread::sleep(CANCEL_POLL),
                Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
            }
        }
    }

    /// Run one command and parse the response. Any failure tears the connection down.
    fn call<T>(
        &self,
        command: &Command,
        cancel: Option<&CancelToken>,
        parse: impl FnOnce(&str) -> ClientResult<T>,
    ) -> ClientResult<T> {
        let mut guard = self.lock_connection(cancel)?;

        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(ClientError::Unavailable);
        };

        let timeout = self.timeout_for(command);
        let result = conn.exchange(command, timeout, cancel).and_then(|line| parse(&line));
        if let Err(e) = &result {
            debug!(command = command.name(), error = %e, "dropping index service connection");
            *guard = None;
        }
        result
    }

    /// Liveness check
    pub fn ping(&self) -> bool {
        self.call(&Command::Ping, None, |line| {
            if line.contains("pong") {
                Ok(())
            } else {
                Err(ClientError::Protocol(format!("unexpected ping reply {:?}", line)))
            }
        })
        .is_ok()
    }

    /// Search one bookmark root. Returns `Cancelled` without further I/O once `cancel` is set.
    pub fn search(
        &self,
        bookmark_path: &Path,
        query: &str,
        extension: Option<&str>,
        kind: EntryKind,
        cancel: &CancelToken,
    ) -> ClientResult<SearchReply> {
        let command = Command::Search(SearchPayload {
            bookmark_path: bookmark_path.to_string_lossy().into_owned(),
            mode: kind.service_mode().to_string(),
            query: query.to_string(),
            extension: extension.map(str::to_string),
        });
        self.call(&command, Some(cancel), parse_search)
    }

    /// Search several roots in one round trip
    pub fn search_all(
        &self,
        bookmark_paths: &[PathBuf],
        query: &str,
        extension: Option<&str>,
        cancel: &CancelToken,
    ) -> ClientResult<SearchReply> {
        let command = Command::SearchAll(SearchAllPayload {
            bookmark_paths: bookmark_paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            query: query.to_string(),
            extension: extension.map(str::to_string),
        });
        self.call(&command, Some(cancel), parse_search)
    }

    /// Ask the service to index a root. Blocks while the service walks it.
    pub fn register_bookmark(&self, name: &str, path: &Path, is_network: bool) -> bool {
        let command = Command::AddBookmark(BookmarkPayload {
            name: name.to_string(),
            path: path.to_string_lossy().into_owned(),
            is_network,
        });
        let accepted = self
            .call(&command, None, |line| {
                let resp: StatusResponse = parse_json(line)?;
                if let Some(err) = resp.error {
                    return Err(ClientError::Server(err));
                }
                Ok(resp.status.as_deref() == Some("ok"))
            })
            .unwrap_or(false);

        if accepted {
            info!(bookmark = name, "registered bookmark with index service");
        }
        accepted
    }

    /// Force a full re-walk of one root; returns the number of entries indexed
    pub fn rescan(&self, path: &Path) -> ClientResult<u64> {
        self.call(&Command::Rescan(path.to_path_buf()), None, |line| {
            let resp: StatusResponse = parse_json(line)?;
            if let Some(err) = resp.error {
                return Err(ClientError::Server(err));
            }
            resp.indexed
                .ok_or_else(|| ClientError::Protocol("missing `indexed` field".to_string()))
        })
    }

    /// Service counters; `connected` is false when the service could not be reached
    pub fn stats(&self) -> ServiceStats {
        self.call(&Command::Stats, None, |line| {
            let resp: StatsResponse = parse_json(line)?;
            if let Some(err) = resp.error {
                return Err(ClientError::Server(err));
            }
            Ok(ServiceStats {
                file_count: resp.files,
                term_count: resp.trigrams,
                bookmark_count: resp.bookmarks,
                connected: true,
            })
        })
        .unwrap_or_default()
    }
}

fn parse_json<T: DeserializeOwned>(line: &str) -> ClientResult<T> {
    serde_json::from_str(line).map_err(|e| ClientError::Protocol(e.to_string()))
}

fn parse_search(line: &str) -> ClientResult<SearchReply> {
    let resp: SearchResponse = parse_json(line)?;
    if let Some(err) = resp.error {
        return Err(ClientError::Server(err));
    }
    let results = resp
        .results
        .ok_or_else(|| ClientError::Protocol("missing `results` field".to_string()))?;

    Ok(SearchReply {
        entries: results.into_iter().map(into_entry).collect(),
        total_indexed: resp.total_indexed,
        elapsed_ms: resp.search_time_ms,
    })
}

fn into_entry(wire: WireEntry) -> ResultEntry {
    let mut entry = ResultEntry::new(wire.path, wire.is_dir, wire.mtime);
    entry.origin_bookmark = wire.bookmark;
    entry
}

/// Register every bookmark with the service on a background thread.
///
/// Uses its own client so it never blocks or shares the search connection.
/// Does not launch the service.
pub fn spawn_bookmark_sync(socket_path: PathBuf, bookmarks: Vec<Bookmark>) -> io::Result<JoinHandle<usize>> {
    thread::Builder::new()
        .name("bookmark-sync".to_string())
        .spawn(move || {
            let client = IndexClient::new(socket_path).with_autostart(false);
            let mut registered = 0;
            for bookmark in &bookmarks {
                if client.register_bookmark(&bookmark.name, &bookmark.path, bookmark.is_network) {
                    registered += 1;
                } else if !client.is_connected() && !client.ping() {
                    warn!("index service unreachable, stopping bookmark sync");
                    break;
                }
            }
            registered
        })
}
