use crate::query::ParsedQuery;
use crate::utils::Bookmark;
use std::path::PathBuf;
use std::time::Duration;

/// What the search term is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// File and directory names (index service, `fd` fallback)
    #[default]
    Name,
    /// File contents (`rg`)
    Content,
}

impl SearchMode {
    /// Quiet period after the last keystroke before a search is dispatched
    pub fn debounce(self) -> Duration {
        match self {
            SearchMode::Name => Duration::from_millis(100),
            SearchMode::Content => Duration::from_millis(250),
        }
    }
}

/// Which entry kinds a name search returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EntryKind {
    #[default]
    All,
    Files,
    Dirs,
}

impl EntryKind {
    /// Mode string understood by the index service `SEARCH` command
    pub fn service_mode(self) -> &'static str {
        match self {
            EntryKind::All => "all",
            EntryKind::Files => "gotofile",
            EntryKind::Dirs => "gotodir",
        }
    }

    /// `fd --type` argument, if the kind needs one
    pub fn fd_type(self) -> Option<&'static str> {
        match self {
            EntryKind::All => None,
            EntryKind::Files => Some("f"),
            EntryKind::Dirs => Some("d"),
        }
    }

    pub fn accepts(self, is_dir: bool) -> bool {
        match self {
            EntryKind::All => true,
            EntryKind::Files => !is_dir,
            EntryKind::Dirs => is_dir,
        }
    }

    pub fn next(self) -> Self {
        match self {
            EntryKind::All => EntryKind::Files,
            EntryKind::Files => EntryKind::Dirs,
            EntryKind::Dirs => EntryKind::All,
        }
    }
}

/// One bookmark root a search runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub root: PathBuf,
    pub bookmark: String,
}

impl From<&Bookmark> for Target {
    fn from(b: &Bookmark) -> Self {
        Self {
            root: b.path.clone(),
            bookmark: b.name.clone(),
        }
    }
}

/// Where a search runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// A single bookmark root
    Bookmark(Target),
    /// Every configured bookmark, in configuration order
    AllBookmarks(Vec<Target>),
}

/// An immutable search request, rebuilt for every debounce cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub scope: SearchScope,
    pub term: String,
    pub extension: Option<String>,
    pub kind: EntryKind,
    pub mode: SearchMode,
}

impl SearchRequest {
    /// Build a request from parsed input.
    ///
    /// A parsed scope wins over `selected` (the bookmark picked in the UI);
    /// with neither, the request spans all bookmarks.
    pub fn build(
        parsed: &ParsedQuery,
        bookmarks: &[Bookmark],
        selected: Option<&Bookmark>,
        kind: EntryKind,
        mode: SearchMode,
    ) -> Self {
        let scoped = parsed
            .scope
            .as_deref()
            .and_then(|name| bookmarks.iter().find(|b| b.matches_name(name)))
            .or(selected);

        let scope = match scoped {
            Some(bookmark) => SearchScope::Bookmark(Target::from(bookmark)),
            None => SearchScope::AllBookmarks(bookmarks.iter().map(Target::from).collect()),
        };

        Self {
            scope,
            term: parsed.term.clone(),
            extension: parsed.extension.clone(),
            kind,
            mode,
        }
    }

    /// Roots to scan, in order
    pub fn targets(&self) -> &[Target] {
        match &self.scope {
            SearchScope::Bookmark(target) => std::slice::from_ref(target),
            SearchScope::AllBookmarks(targets) => targets,
        }
    }
}

/// A matching line inside a file (content search only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    pub line_number: u32,
    pub text: String,
}

/// One search hit, whichever backend produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// Modification time in seconds since the epoch, 0 when unknown
    pub mtime: i64,
    pub origin_bookmark: Option<String>,
    pub matches: Vec<ContentMatch>,
}

impl ResultEntry {
    pub fn new(path: impl Into<PathBuf>, is_dir: bool, mtime: i64) -> Self {
        Self {
            path: path.into(),
            is_dir,
            mtime,
            origin_bookmark: None,
            matches: Vec::new(),
        }
    }
}

/// Newest first. Stable, so equal mtimes keep backend order.
pub fn sort_by_mtime_desc(entries: &mut [ResultEntry]) {
    entries.sort_by(|a, b| b.mtime.cmp(&a.mtime));
}

/// Which path produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    IndexService,
    Fallback,
}

/// Results of one completed search
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub entries: Vec<ResultEntry>,
    pub backend: Backend,
    /// Total entries in the service index (0 for fallback scans)
    pub total_indexed: u64,
    pub elapsed: Duration,
}

impl SearchResults {
    pub fn empty(backend: Backend) -> Self {
        Self {
            entries: Vec::new(),
            backend,
            total_indexed: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Status line text: `"12 (3ms, 1,234 indexed)"` for service results, `"12"` otherwise
    pub fn status_text(&self) -> String {
        let count = self.entries.len();
        if self.backend == Backend::IndexService && self.total_indexed > 0 {
            format!(
                "{} ({}ms, {} indexed)",
                count,
                self.elapsed.as_millis(),
                group_thousands(self.total_indexed)
            )
        } else {
            count.to_string()
        }
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
