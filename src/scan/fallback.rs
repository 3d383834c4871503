//! Degraded-mode search with external tools
//!
//! Spawns one `fd` (name search) or `rg` (content search) process per bookmark
//! root, sequentially, and turns its output into [`ResultEntry`] rows.
//! Failures are contained per target: a root whose tool fails contributes nothing,
//! a root whose tool times out contributes what it printed before being killed.

use crate::scan::orchestrator::CancelToken;
use crate::scan::types::{ContentMatch, ResultEntry, SearchRequest, Target, sort_by_mtime_desc};
use crate::utils::AppConfig;
use globset::Glob;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{debug, warn};

/// Matches per file kept by content search
pub const MAX_MATCHES_PER_FILE: usize = 5;

/// Distinct files kept by content search, across all roots
pub const MAX_CONTENT_FILES: usize = 200;

/// Snippet length limit, in characters
pub const MAX_SNIPPET_CHARS: usize = 200;

/// How often a waiting worker re-checks cancellation and the deadline
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to keep collecting already-printed lines after killing a process
const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// `rg` exit code when some files could not be read; matches already printed are valid
const RG_PARTIAL_FAILURE: i32 = 2;

/// `path:line:text` as printed by `rg --with-filename --line-number`
static CONTENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?):(\d+):(.*)$").expect("valid regex"));

/// How a spawned process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessStatus {
    Exited { success: bool, code: Option<i32> },
    TimedOut,
    Cancelled,
    SpawnFailed,
}

#[derive(Debug)]
struct ProcessOutput {
    lines: Vec<String>,
    status: ProcessStatus,
}

impl ProcessOutput {
    /// Lines that should be turned into results. `partial_code` is an exit code
    /// whose output is still kept.
    fn into_usable_lines(self, partial_code: Option<i32>) -> Vec<String> {
        match self.status {
            ProcessStatus::Exited { success: true, .. } | ProcessStatus::TimedOut => self.lines,
            ProcessStatus::Exited { code, .. } if code.is_some() && code == partial_code => self.lines,
            _ => Vec::new(),
        }
    }
}

/// External-tool scanner used when the index service is unavailable
#[derive(Debug, Clone)]
pub struct FallbackScanner {
    fd_command: String,
    rg_command: String,
    exclude_patterns: Vec<String>,
    max_results: usize,
    timeout: Duration,
}

impl Default for FallbackScanner {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl FallbackScanner {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fd_command: config.fd_command.clone(),
            rg_command: config.rg_command.clone(),
            exclude_patterns: valid_patterns(&config.exclude_patterns),
            max_results: config.max_results,
            timeout: Duration::from_secs(config.scan_timeout_secs),
        }
    }

    pub fn with_fd_command(mut self, command: impl Into<String>) -> Self {
        self.fd_command = command.into();
        self
    }

    pub fn with_rg_command(mut self, command: impl Into<String>) -> Self {
        self.rg_command = command.into();
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Self {
        self.exclude_patterns = valid_patterns(patterns);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Name search over every target of the request.
    ///
    /// Returns the merged entries, newest first, capped at `max_results`.
    pub fn scan(&self, request: &SearchRequest, cancel: &CancelToken) -> Vec<ResultEntry> {
        let mut merged = Vec::new();

        for target in request.targets() {
            if cancel.is_cancelled() {
                return Vec::new();
            }

            let output = self.run_process(self.name_command(request, target), cancel);
            let before = merged.len();
            for line in output.into_usable_lines(None) {
                let Some(path) = normalize_path_line(&line) else {
                    continue;
                };
                let (is_dir, mtime) = stat_entry(&path, line.trim_end().ends_with('/'));
                let mut entry = ResultEntry::new(path, is_dir, mtime);
                entry.origin_bookmark = Some(target.bookmark.clone());
                merged.push(entry);
            }
            debug!(root = %target.root.display(), found = merged.len() - before, "fallback name scan");
        }

        merge_and_truncate(merged, self.max_results)
    }

    /// Content search: files whose text contains the term, with matching lines attached
    pub fn scan_content(&self, request: &SearchRequest, cancel: &CancelToken) -> Vec<ResultEntry> {
        if request.term.trim().is_empty() {
            return Vec::new();
        }

        let mut files: Vec<ResultEntry> = Vec::new();
        let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

        for target in request.targets() {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            if files.len() >= MAX_CONTENT_FILES {
                break;
            }

            let output = self.run_process(self.content_command(request, target), cancel);
            for line in output.into_usable_lines(Some(RG_PARTIAL_FAILURE)) {
                let Some((path, line_number, text)) = parse_content_line(&line) else {
                    continue;
                };

                if let Some(&idx) = by_path.get(&path) {
                    let entry = &mut files[idx];
                    if entry.matches.len() < MAX_MATCHES_PER_FILE {
                        entry.matches.push(ContentMatch { line_number, text });
                    }
                    continue;
                }
                if files.len() >= MAX_CONTENT_FILES {
                    continue;
                }

                let (is_dir, mtime) = stat_entry(&path, false);
                let mut entry = ResultEntry::new(path.clone(), is_dir, mtime);
                entry.origin_bookmark = Some(target.bookmark.clone());
                entry.matches.push(ContentMatch { line_number, text });
                by_path.insert(path, files.len());
                files.push(entry);
            }
        }

        sort_by_mtime_desc(&mut files);
        files
    }

    fn name_command(&self, request: &SearchRequest, target: &Target) -> Command {
        let mut cmd = Command::new(&self.fd_command);
        cmd.args(["--color=never", "--absolute-path"]);
        if let Some(kind) = request.kind.fd_type() {
            cmd.args(["--type", kind]);
        }
        for pattern in &self.exclude_patterns {
            cmd.arg("--exclude").arg(pattern);
        }
        if let Some(ext) = &request.extension {
            cmd.arg("--extension").arg(ext);
        }
        cmd.arg("--max-results").arg(self.max_results.max(1).to_string());

        if request.term.is_empty() {
            cmd.args(["--", "."]);
        } else {
            cmd.args(["--fixed-strings", "--"]).arg(&request.term);
        }
        cmd.arg(&target.root);
        cmd
    }

    fn content_command(&self, request: &SearchRequest, target: &Target) -> Command {
        let mut cmd = Command::new(&self.rg_command);
        cmd.args([
            "--line-number",
            "--no-heading",
            "--with-filename",
            "--color=never",
            "--ignore-case",
            "--fixed-strings",
        ]);
        cmd.arg("--max-count").arg(MAX_MATCHES_PER_FILE.to_string());
        for pattern in &self.exclude_patterns {
            cmd.arg("--glob").arg(format!("!{}", pattern));
        }
        if let Some(ext) = &request.extension {
            cmd.arg("--glob").arg(format!("*.{}", ext));
        }
        cmd.arg("--").arg(&request.term).arg(&target.root);
        cmd
    }

    /// Run a process to completion, timeout, or cancellation, collecting stdout lines.
    fn run_process(&self, mut cmd: Command, cancel: &CancelToken) -> ProcessOutput {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = ?cmd.get_program(), error = %e, "failed to spawn search tool");
                return ProcessOutput {
                    lines: Vec::new(),
                    status: ProcessStatus::SpawnFailed,
                };
            }
        };

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return ProcessOutput {
                lines: Vec::new(),
                status: ProcessStatus::SpawnFailed,
            };
        };

        // The reader thread is detached: a grandchild holding the pipe open must not
        // block the worker after the direct child was killed.
        let (tx, rx) = mpsc::channel::<String>();
        let spawned = thread::Builder::new()
            .name("scan-reader".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if buf.last() == Some(&b'\n') {
                                buf.pop();
                            }
                            // Non UTF-8 paths are skipped
                            let Ok(line) = String::from_utf8(std::mem::take(&mut buf)) else {
                                continue;
                            };
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start output reader");
            let _ = child.kill();
            let _ = child.wait();
            return ProcessOutput {
                lines: Vec::new(),
                status: ProcessStatus::SpawnFailed,
            };
        }

        let deadline = Instant::now() + self.timeout;
        let mut lines = Vec::new();
        let mut stdout_open = true;

        // A tool may close stdout and keep running, so exit is polled under the same deadline
        let status = loop {
            if cancel.is_cancelled() {
                break ProcessStatus::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                break ProcessStatus::TimedOut;
            }
            let wait = POLL_INTERVAL.min(deadline - now);

            if stdout_open {
                match rx.recv_timeout(wait) {
                    Ok(line) => lines.push(line),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => stdout_open = false,
                }
                continue;
            }

            match child.try_wait() {
                Ok(Some(exit)) => {
                    break ProcessStatus::Exited {
                        success: exit.success(),
                        code: exit.code(),
                    };
                }
                Ok(None) => thread::sleep(wait),
                Err(e) => {
                    warn!(program = ?cmd.get_program(), error = %e, "failed to wait for search tool");
                    let _ = child.kill();
                    let _ = child.wait();
                    break ProcessStatus::Exited {
                        success: false,
                        code: None,
                    };
                }
            }
        };

        if matches!(status, ProcessStatus::TimedOut | ProcessStatus::Cancelled) {
            let _ = child.kill();
            let _ = child.wait();
        }
        if status == ProcessStatus::TimedOut {
            warn!(program = ?cmd.get_program(), timeout = ?self.timeout, "search tool timed out, keeping partial output");
            while let Ok(line) = rx.recv_timeout(DRAIN_GRACE) {
                lines.push(line);
            }
        }

        ProcessOutput { lines, status }
    }
}

/// Drop exclude patterns that are not valid globs
fn valid_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .filter(|pattern| match Glob::new(pattern) {
            Ok(_) => true,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "ignoring invalid exclude pattern");
                false
            }
        })
        .cloned()
        .collect()
}

/// One `fd` output line as a path, without the trailing separator on directories
fn normalize_path_line(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let trimmed = line.trim_end_matches('/');
    Some(PathBuf::from(if trimmed.is_empty() { "/" } else { trimmed }))
}

/// Kind and mtime of a path. Stat failure keeps the entry with mtime 0.
fn stat_entry(path: &Path, dir_hint: bool) -> (bool, i64) {
    match fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            (meta.is_dir(), mtime)
        }
        Err(_) => (dir_hint, 0),
    }
}

/// Sort newest first, then cap the merged list
pub fn merge_and_truncate(mut entries: Vec<ResultEntry>, max_results: usize) -> Vec<ResultEntry> {
    sort_by_mtime_desc(&mut entries);
    entries.truncate(max_results);
    entries
}

/// Parse `path:line:text`; the snippet is trimmed and length-limited
pub fn parse_content_line(line: &str) -> Option<(PathBuf, u32, String)> {
    let caps = CONTENT_LINE.captures(line)?;
    let path = caps.get(1)?.as_str();
    if path.is_empty() {
        return None;
    }
    let line_number = caps.get(2)?.as_str().parse().ok()?;
    let text = truncate_snippet(caps.get(3)?.as_str().trim(), MAX_SNIPPET_CHARS);
    Some((PathBuf::from(path), line_number, text))
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}
