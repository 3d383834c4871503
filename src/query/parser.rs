use crate::utils::Bookmark;
use regex::Regex;
use std::sync::LazyLock;

/// `*.ext` token anywhere in the query, plus the whitespace that follows it
static EXT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\.(\w+)\s*").expect("extension pattern is valid"));

/// Result of splitting raw input into scope, extension filter and search term
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Configured name of the bookmark selected by a `name:` prefix
    pub scope: Option<String>,
    /// Extension filter taken from the first `*.ext` token, without the `*.`
    pub extension: Option<String>,
    /// Remaining free text. Empty means "match everything in scope".
    pub term: String,
}

impl ParsedQuery {
    /// Check if the query carries any modifier besides the term
    pub fn has_modifiers(&self) -> bool {
        self.scope.is_some() || self.extension.is_some()
    }
}

/// Parse raw search box text against the configured bookmarks.
///
/// `"proj: *.md readme"` with a bookmark named `proj` yields scope `proj`,
/// extension `md` and term `readme`. A colon whose prefix is not a bookmark
/// name is not a separator, so `"C:\\Users"` stays a plain term.
pub fn parse_query(input: &str, bookmarks: &[Bookmark]) -> ParsedQuery {
    let text = input.trim();

    let (scope, rest) = match split_scope(text, bookmarks) {
        Some((bookmark, rest)) => (Some(bookmark.name.clone()), rest),
        None => (None, text),
    };

    let (extension, term) = split_extension(rest);

    ParsedQuery {
        scope,
        extension,
        term,
    }
}

/// Split off a `bookmark:` prefix if it names a known bookmark (case-insensitive)
fn split_scope<'a, 'b>(text: &'a str, bookmarks: &'b [Bookmark]) -> Option<(&'b Bookmark, &'a str)> {
    let (prefix, rest) = text.split_once(':')?;
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return None;
    }

    let wanted = prefix.to_lowercase();
    bookmarks
        .iter()
        .find(|b| b.name.to_lowercase() == wanted)
        .map(|b| (b, rest.trim()))
}

/// Remove the first `*.ext` token and return its suffix with the cleaned term
fn split_extension(text: &str) -> (Option<String>, String) {
    let Some(caps) = EXT_TOKEN.captures(text) else {
        return (None, text.trim().to_string());
    };

    let (Some(whole), Some(ext)) = (caps.get(0), caps.get(1)) else {
        return (None, text.trim().to_string());
    };

    let mut term = String::with_capacity(text.len());
    term.push_str(&text[..whole.start()]);
    term.push_str(&text[whole.end()..]);

    (Some(ext.as_str().to_string()), term.trim().to_string())
}
