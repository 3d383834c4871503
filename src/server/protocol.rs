//! Wire protocol for the index service
//!
//! Line-oriented text protocol:
//! - request: `COMMAND` or `COMMAND <json>` or `RESCAN <path>`, terminated by `\n`
//! - response: exactly one JSON object terminated by `\n`

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-command read/write timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `ADD_BOOKMARK` may walk the whole root before answering
pub const ADD_BOOKMARK_TIMEOUT: Duration = Duration::from_secs(300);

/// `RESCAN` re-walks a root; large trees take minutes
pub const RESCAN_TIMEOUT: Duration = Duration::from_secs(600);

/// Sanity cap on a single response line
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Payload of `SEARCH`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPayload {
    pub bookmark_path: String,
    pub mode: String,
    pub query: String,
    pub extension: Option<String>,
}

/// Payload of `SEARCH_ALL`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchAllPayload {
    pub bookmark_paths: Vec<String>,
    pub query: String,
    pub extension: Option<String>,
}

/// Payload of `ADD_BOOKMARK`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookmarkPayload {
    pub name: String,
    pub path: String,
    pub is_network: bool,
}

/// A command sent to the index service
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Search(SearchPayload),
    SearchAll(SearchAllPayload),
    AddBookmark(BookmarkPayload),
    Rescan(PathBuf),
    Stats,
}

impl Command {
    /// Command keyword as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Search(_) => "SEARCH",
            Command::SearchAll(_) => "SEARCH_ALL",
            Command::AddBookmark(_) => "ADD_BOOKMARK",
            Command::Rescan(_) => "RESCAN",
            Command::Stats => "STATS",
        }
    }

    /// How long to wait for the response
    pub fn timeout(&self) -> Duration {
        match self {
            Command::AddBookmark(_) => ADD_BOOKMARK_TIMEOUT,
            Command::Rescan(_) => RESCAN_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Encode as a single request line, without the trailing newline
    pub fn encode(&self) -> io::Result<String> {
        let payload = match self {
            Command::Ping | Command::Stats => None,
            Command::Search(p) => Some(to_json(p)?),
            Command::SearchAll(p) => Some(to_json(p)?),
            Command::AddBookmark(p) => Some(to_json(p)?),
            Command::Rescan(path) => {
                let path = path.to_string_lossy();
                if path.contains('\n') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "path contains a newline",
                    ));
                }
                Some(path.into_owned())
            }
        };

        Ok(match payload {
            Some(p) => format!("{} {}", self.name(), p),
            None => self.name().to_string(),
        })
    }
}

fn to_json(value: &impl Serialize) -> io::Result<String> {
    // serde_json escapes control characters, so the payload stays on one line
    serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// One result row as the service sends it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEntry {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub mtime: i64,
    /// Present on `SEARCH_ALL` results
    #[serde(default)]
    pub bookmark: Option<String>,
}

/// Response to `SEARCH` and `SEARCH_ALL`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResponse {
    /// Absent on error responses
    #[serde(default)]
    pub results: Option<Vec<WireEntry>>,
    #[serde(default)]
    pub total_indexed: u64,
    #[serde(default)]
    pub search_time_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response to `ADD_BOOKMARK` and `RESCAN`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub indexed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response to `STATS`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsResponse {
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub trigrams: u64,
    #[serde(default)]
    pub bookmarks: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Write a command line and flush
pub fn write_message<W: Write>(writer: &mut W, command: &Command) -> io::Result<()> {
    let line = command.encode()?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read one newline-terminated response, however many reads it takes to arrive
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    resume_message(reader, &mut buf)
}

/// Continue reading a response into `buf`.
///
/// Bytes received before a read error (such as a socket read timeout) stay in
/// `buf`, so the call can be repeated until the newline arrives.
pub fn resume_message<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<String> {
    let remaining = MAX_RESPONSE_BYTES.saturating_sub(buf.len() as u64);
    reader.by_ref().take(remaining).read_until(b'\n', buf)?;

    if buf.last() != Some(&b'\n') {
        return Err(if buf.len() as u64 >= MAX_RESPONSE_BYTES {
            io::Error::new(io::ErrorKind::InvalidData, "Message too large")
        } else {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of response",
            )
        });
    }

    buf.pop();
    String::from_utf8(std::mem::take(buf)).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
