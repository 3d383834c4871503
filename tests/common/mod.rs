//! Shared helpers: a fake index service and fake external tools.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How the fake service answers one request line
pub enum Reply {
    /// Write the line plus `\n` in one go
    Line(String),
    /// Write the line plus `\n` in pieces of this many bytes, pausing between them
    Chunked(String, usize),
    /// Close the connection without answering
    Close,
    /// Keep the connection open and never answer
    Silent,
    /// Write these bytes without the terminating newline, then stall
    Partial(String),
}

/// A Unix socket server speaking the index service protocol
pub struct FakeService {
    pub path: PathBuf,
    pub requests: Arc<Mutex<Vec<String>>>,
    pub connections: Arc<AtomicUsize>,
}

impl FakeService {
    pub fn start<F>(path: &Path, handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = UnixListener::bind(path).expect("bind fake service");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let (reqs, conns) = (Arc::clone(&requests), Arc::clone(&connections));
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                conns.fetch_add(1, Ordering::SeqCst);
                let (reqs, handler) = (Arc::clone(&reqs), Arc::clone(&handler));

                thread::spawn(move || {
                    let mut writer = stream.try_clone().unwrap();
                    let mut reader = BufReader::new(stream);
                    let mut line = String::new();
                    loop {
                        line.clear();
                        if reader.read_line(&mut line).unwrap_or(0) == 0 {
                            break;
                        }
                        let request = line.trim_end_matches('\n').to_string();
                        reqs.lock().unwrap().push(request.clone());

                        match handler(&request) {
                            Reply::Line(body) => {
                                if writer.write_all(format!("{}\n", body).as_bytes()).is_err() {
                                    break;
                                }
                            }
                            Reply::Chunked(body, size) => {
                                let data = format!("{}\n", body).into_bytes();
                                for chunk in data.chunks(size) {
                                    if writer.write_all(chunk).is_err() {
                                        break;
                                    }
                                    let _ = writer.flush();
                                    thread::sleep(Duration::from_millis(2));
                                }
                            }
                            Reply::Close => break,
                            Reply::Silent => {}
                            Reply::Partial(body) => {
                                let _ = writer.write_all(body.as_bytes());
                                let _ = writer.flush();
                            }
                        }
                    }
                });
            }
        });

        Self {
            path: path.to_path_buf(),
            requests,
            connections,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Write an executable `/bin/sh` script
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Create a file with a fixed modification time (seconds since the epoch)
pub fn touch(path: &Path, mtime: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = File::create(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime)).unwrap();
}

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// JSON line for a `SEARCH` reply
pub fn search_reply(entries: &[(&str, bool, i64)], total: u64) -> String {
    let results: Vec<serde_json::Value> = entries
        .iter()
        .map(|(path, is_dir, mtime)| serde_json::json!({ "path": path, "is_dir": is_dir, "mtime": mtime }))
        .collect();
    serde_json::json!({ "results": results, "total_indexed": total, "search_time_ms": 3 }).to_string()
}
