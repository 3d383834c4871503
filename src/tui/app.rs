use crate::query::parse_query;
use crate::scan::{
    EntryKind, ResultEntry, ScanOrchestrator, SearchEngine, SearchMode, SearchRequest,
};
use crate::utils::{AppConfig, Bookmark};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Rows moved by PageUp/PageDown
const PAGE_SIZE: usize = 10;

/// How long shutdown waits for a running search
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Application state
pub struct App {
    pub config: AppConfig,
    pub query: String,
    pub results: Vec<ResultEntry>,
    pub selected: usize,
    /// Index into `config.bookmarks`; `None` searches every bookmark
    pub bookmark: Option<usize>,
    pub mode: SearchMode,
    pub kind: EntryKind,
    pub status_message: String,
    /// Cleared by a `toggle` from another instance, restored by the next one
    pub visible: bool,
    orchestrator: ScanOrchestrator<SearchEngine>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let engine = SearchEngine::from_config(&config);

        Self {
            query: String::new(),
            results: Vec::new(),
            selected: 0,
            // Unscoped queries search every bookmark until one is picked
            bookmark: None,
            mode: SearchMode::Name,
            kind: EntryKind::All,
            status_message: "0".to_string(),
            visible: true,
            orchestrator: ScanOrchestrator::new(Arc::new(engine)),
            config,
        }
    }

    pub fn selected_bookmark(&self) -> Option<&Bookmark> {
        self.bookmark.and_then(|i| self.config.bookmarks.get(i))
    }

    /// Label for the scope selector
    pub fn scope_label(&self) -> String {
        match self.selected_bookmark() {
            Some(b) => b.name.clone(),
            None => "all".to_string(),
        }
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.refresh();
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.refresh();
    }

    pub fn pop_char(&mut self) {
        if self.query.pop().is_some() {
            self.refresh();
        }
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
        self.refresh();
    }

    /// Delete the word before the cursor (Ctrl+W)
    pub fn delete_word(&mut self) {
        let trimmed = self.query.trim_end();
        let cut = trimmed
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.query.truncate(cut);
        self.refresh();
    }

    /// Re-parse the query and restart the debounce
    pub fn refresh(&mut self) {
        let request = self.current_request();
        self.orchestrator.query_changed(request);
        self.status_message = "...".to_string();
    }

    /// Request for the current query, selector, kind and mode
    pub fn current_request(&mut self) -> SearchRequest {
        let parsed = parse_query(&self.query, &self.config.bookmarks);

        // A typed scope also moves the selector
        if let Some(scope) = &parsed.scope
            && let Some(idx) = self.config.bookmarks.iter().position(|b| b.matches_name(scope))
        {
            self.bookmark = Some(idx);
        }

        SearchRequest::build(
            &parsed,
            &self.config.bookmarks,
            self.selected_bookmark(),
            self.kind,
            self.mode,
        )
    }

    /// Drive the orchestrator; call once per event loop iteration
    pub fn tick(&mut self) {
        self.orchestrator.tick();
        if let Some(results) = self.orchestrator.poll_results() {
            self.status_message = results.status_text();
            self.results = results.entries;
            self.selected = 0;
        }
    }

    pub fn toggle_visibility(&mut self) {
        self.visible = !self.visible;
        if self.visible {
            self.refresh();
        } else {
            self.orchestrator.cancel();
        }
    }

    pub fn toggle_content_mode(&mut self) {
        self.mode = match self.mode {
            SearchMode::Name => SearchMode::Content,
            SearchMode::Content => SearchMode::Name,
        };
        self.refresh();
    }

    pub fn cycle_kind(&mut self) {
        self.kind = self.kind.next();
        self.refresh();
    }

    /// Step through the bookmarks, then "all", then back to the first
    pub fn cycle_bookmark(&mut self) {
        let count = self.config.bookmarks.len();
        self.bookmark = match self.bookmark {
            None if count > 0 => Some(0),
            Some(i) if i + 1 < count => Some(i + 1),
            _ => None,
        };

        if let Some(idx) = self.bookmark {
            self.config.last_bookmark = idx;
            if let Err(e) = self.config.save() {
                warn!(error = %e, "failed to save selected bookmark");
            }
        }
        self.refresh();
    }

    pub fn selected_entry(&self) -> Option<&ResultEntry> {
        self.results.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 1).min(self.results.len() - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_page_down(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + PAGE_SIZE).min(self.results.len() - 1);
        }
    }

    pub fn select_page_up(&mut self) {
        self.selected = self.selected.saturating_sub(PAGE_SIZE);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.results.len().saturating_sub(1);
    }

    /// Hand the selected entry to the desktop opener. Returns whether one was launched.
    pub fn open_selected(&mut self) -> bool {
        let Some(entry) = self.selected_entry() else {
            return false;
        };
        let path = entry.path.clone();

        match open_path(&path) {
            Ok(()) => true,
            Err(e) => {
                self.status_message = format!("Error: {}", e);
                false
            }
        }
    }

    /// Path shown in the results list, relative to its bookmark root when possible
    pub fn display_path(&self, entry: &ResultEntry) -> String {
        let root = entry
            .origin_bookmark
            .as_deref()
            .and_then(|name| self.config.bookmarks.iter().find(|b| b.matches_name(name)))
            .map(|b| b.path.as_path());

        let shown = root
            .and_then(|root| entry.path.strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .unwrap_or(&entry.path);

        if entry.is_dir {
            format!("{}/", shown.display())
        } else {
            shown.display().to_string()
        }
    }

    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown(SHUTDOWN_WAIT);
    }
}

fn open_path(path: &Path) -> std::io::Result<()> {
    use std::os::unix::process::CommandExt;

    Command::new("xdg-open")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map(|_| ())
}
