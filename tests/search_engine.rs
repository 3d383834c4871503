//! Full search cycles: orchestrator -> engine -> service or fallback.

mod common;

use common::{search_reply, touch, write_script, FakeService, Reply};
use nixnav::query::parse_query;
use nixnav::scan::{
    Backend, CancelToken, EntryKind, FallbackScanner, ScanOrchestrator, SearchBackend,
    SearchEngine, SearchMode, SearchRequest,
};
use nixnav::server::IndexClient;
use nixnav::utils::Bookmark;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// `fd` stand-in that records that it ran, then lists the root
fn recording_fd(dir: &Path, marker: &Path) -> PathBuf {
    write_script(
        dir,
        "fd",
        &format!(
            r#"
touch '{}'
for root; do :; done
for f in "$root"/*; do printf '%s\n' "$f"; done
"#,
            marker.display()
        ),
    )
}

fn engine(socket: &Path, fallback: FallbackScanner) -> SearchEngine {
    let client = IndexClient::new(socket).with_autostart(false);
    SearchEngine::new(Arc::new(client), fallback)
}

fn request(bookmarks: &[Bookmark], query: &str, mode: SearchMode) -> SearchRequest {
    let parsed = parse_query(query, bookmarks);
    SearchRequest::build(&parsed, bookmarks, None, EntryKind::All, mode)
}

#[test]
fn test_service_hit_skips_fallback() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("fd-ran");
    let service = FakeService::start(&dir.path().join("svc.sock"), |_| {
        Reply::Line(search_reply(&[("/x/old", false, 1), ("/x/new", false, 9)], 50_000))
    });
    let fallback = FallbackScanner::default().with_fd_command(recording_fd(dir.path(), &marker).to_string_lossy());

    let bookmarks = vec![Bookmark::new("proj", "/x"), Bookmark::new("other", "/y")];
    let req = request(&bookmarks, "proj: *.md readme", SearchMode::Name);
    let results = engine(&service.path, fallback).search(&req, &CancelToken::new());

    assert_eq!(results.backend, Backend::IndexService);
    assert_eq!(results.entries[0].path, PathBuf::from("/x/new"));
    assert_eq!(results.entries[0].origin_bookmark.as_deref(), Some("proj"));
    assert_eq!(results.status_text(), "2 (3ms, 50,000 indexed)");
    assert!(!marker.exists());

    let payload: serde_json::Value =
        serde_json::from_str(service.requests()[0].strip_prefix("SEARCH ").unwrap()).unwrap();
    assert_eq!(payload["bookmark_path"], "/x");
    assert_eq!(payload["query"], "readme");
    assert_eq!(payload["extension"], "md");
}

#[test]
fn test_unscoped_query_uses_search_all() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&dir.path().join("svc.sock"), |_| {
        Reply::Line(
            r#"{"results":[{"path":"/x/d","is_dir":true,"mtime":5,"bookmark":"a"},{"path":"/y/f","is_dir":false,"mtime":3,"bookmark":"b"}],"total_indexed":2,"search_time_ms":1}"#
                .to_string(),
        )
    });

    let bookmarks = vec![Bookmark::new("a", "/x"), Bookmark::new("b", "/y")];
    let mut req = request(&bookmarks, "f", SearchMode::Name);
    req.kind = EntryKind::Files;
    let results = engine(&service.path, FallbackScanner::default()).search(&req, &CancelToken::new());

    assert_eq!(results.entries.len(), 1);
    assert_eq!(results.entries[0].origin_bookmark.as_deref(), Some("b"));

    let line = &service.requests()[0];
    let payload: serde_json::Value = serde_json::from_str(line.strip_prefix("SEARCH_ALL ").unwrap()).unwrap();
    assert_eq!(payload["bookmark_paths"], serde_json::json!(["/x", "/y"]));
}

#[test]
fn test_service_down_falls_back() {
    let dir = TempDir::new().unwrap();
    let (x, y) = (dir.path().join("x"), dir.path().join("y"));
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        touch(&x.join(name), 100 + i as u64 * 20);
    }
    for (i, name) in ["d", "e"].iter().enumerate() {
        touch(&y.join(name), 110 + i as u64 * 20);
    }

    let marker = dir.path().join("fd-ran");
    let fallback = FallbackScanner::default().with_fd_command(recording_fd(dir.path(), &marker).to_string_lossy());
    let search = engine(&dir.path().join("missing.sock"), fallback);

    let bookmarks = vec![Bookmark::new("a", &x), Bookmark::new("b", &y)];
    let mut orchestrator = ScanOrchestrator::new(Arc::new(search));
    let results = orchestrator
        .run_once(request(&bookmarks, "", SearchMode::Name), Duration::from_secs(10))
        .unwrap();

    assert!(marker.exists());
    assert_eq!(results.backend, Backend::Fallback);
    assert_eq!(results.entries.len(), 5);
    let mtimes: Vec<i64> = results.entries.iter().map(|e| e.mtime).collect();
    assert_eq!(mtimes, [140, 130, 120, 110, 100]);
    assert_eq!(results.status_text(), "5");
}

#[test]
fn test_protocol_error_falls_back_for_that_search() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("r");
    touch(&root.join("only"), 10);

    let service = FakeService::start(&dir.path().join("svc.sock"), |_| Reply::Line("{oops".to_string()));
    let marker = dir.path().join("fd-ran");
    let fallback = FallbackScanner::default().with_fd_command(recording_fd(dir.path(), &marker).to_string_lossy());

    let bookmarks = vec![Bookmark::new("r", &root)];
    let results = engine(&service.path, fallback).search(&request(&bookmarks, "only", SearchMode::Name), &CancelToken::new());

    assert_eq!(results.backend, Backend::Fallback);
    assert_eq!(results.entries.len(), 1);
    assert!(marker.exists());
}

#[test]
fn test_content_mode_never_asks_service() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&dir.path().join("svc.sock"), |_| Reply::Line(search_reply(&[], 0)));
    let rg = write_script(
        dir.path(),
        "rg",
        r#"for root; do :; done; printf '%s:2:needle here\n' "$root/file.txt""#,
    );
    let fallback = FallbackScanner::default().with_rg_command(rg.to_string_lossy());

    let bookmarks = vec![Bookmark::new("a", "/x")];
    let results = engine(&service.path, fallback).search(&request(&bookmarks, "needle", SearchMode::Content), &CancelToken::new());

    assert_eq!(results.entries.len(), 1);
    assert_eq!(results.entries[0].path, PathBuf::from("/x/file.txt"));
    assert_eq!(results.entries[0].matches[0].text, "needle here");
    assert!(service.requests().is_empty());
}

#[test]
fn test_rapid_queries_accept_only_last() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&dir.path().join("svc.sock"), |req| {
        // Echo the query back as the single result path
        let payload: serde_json::Value = serde_json::from_str(req.splitn(2, ' ').nth(1).unwrap_or("{}")).unwrap_or_default();
        let path = format!("/{}", payload["query"].as_str().unwrap_or(""));
        thread::sleep(Duration::from_millis(20));
        Reply::Line(search_reply(&[(path.as_str(), false, 1)], 1))
    });

    let bookmarks = vec![Bookmark::new("a", "/x")];
    let mut orchestrator = ScanOrchestrator::new(Arc::new(engine(&service.path, FallbackScanner::default())));

    for query in ["r", "re", "rea", "read"] {
        orchestrator.query_changed(request(&bookmarks, query, SearchMode::Name));
        orchestrator.tick();
        thread::sleep(Duration::from_millis(30));
    }

    // Only the last query ever gets past its debounce
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut accepted = Vec::new();
    while Instant::now() < deadline && accepted.is_empty() {
        orchestrator.tick();
        if let Some(results) = orchestrator.poll_results() {
            accepted.push(results);
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].entries[0].path, PathBuf::from("/read"));
    assert_eq!(orchestrator.generation(), 1);
    assert_eq!(service.requests().len(), 1);
}

#[test]
fn test_stalled_service_times_out_into_fallback() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("r");
    touch(&root.join("only"), 10);

    let service = FakeService::start(&dir.path().join("svc.sock"), |_| Reply::Partial(r#"{"results": ["#.to_string()));
    let client = IndexClient::new(&service.path)
        .with_autostart(false)
        .with_default_timeout(Duration::from_millis(300));
    let marker = dir.path().join("fd-ran");
    let fallback = FallbackScanner::default().with_fd_command(recording_fd(dir.path(), &marker).to_string_lossy());
    let search = SearchEngine::new(Arc::new(client), fallback);

    let bookmarks = vec![Bookmark::new("r", &root)];
    let results = search.search(&request(&bookmarks, "only", SearchMode::Name), &CancelToken::new());

    assert_eq!(results.backend, Backend::Fallback);
    assert_eq!(results.entries.len(), 1);
    assert!(marker.exists());
    assert!(!search.client().is_connected());
}

#[test]
fn test_superseded_searches_do_not_queue_on_silent_service() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("r");
    touch(&root.join("only"), 10);

    let service = FakeService::start(&dir.path().join("svc.sock"), |_| Reply::Silent);
    let client = IndexClient::new(&service.path)
        .with_autostart(false)
        .with_default_timeout(Duration::from_secs(1));
    let marker = dir.path().join("fd-ran");
    let fallback = FallbackScanner::default().with_fd_command(recording_fd(dir.path(), &marker).to_string_lossy());
    let mut orchestrator = ScanOrchestrator::new(Arc::new(SearchEngine::new(Arc::new(client), fallback)));

    // Each query outlives its debounce, so every one reaches the service
    let bookmarks = vec![Bookmark::new("r", &root)];
    let mut last_issued = Instant::now();
    for query in ["o", "on", "onl"] {
        orchestrator.query_changed(request(&bookmarks, query, SearchMode::Name));
        last_issued = Instant::now();
        while last_issued.elapsed() < Duration::from_millis(150) {
            orchestrator.tick();
            thread::sleep(Duration::from_millis(5));
        }
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut accepted = None;
    while accepted.is_none() && Instant::now() < deadline {
        orchestrator.tick();
        accepted = orchestrator.poll_results();
        thread::sleep(Duration::from_millis(5));
    }

    // One service timeout for the current search, not one per superseded keystroke
    let waited = last_issued.elapsed();
    let results = accepted.unwrap();
    assert_eq!(results.backend, Backend::Fallback);
    assert_eq!(results.entries.len(), 1);
    assert!(waited < Duration::from_millis(1900), "waited {:?}", waited);
}
