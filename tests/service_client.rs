//! Index service client against a fake service on a Unix socket.

mod common;

use common::{search_reply, write_script, FakeService, Reply};
use nixnav::scan::{CancelToken, EntryKind};
use nixnav::server::{spawn_bookmark_sync, ClientError, IndexClient};
use nixnav::utils::Bookmark;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn socket(dir: &TempDir) -> PathBuf {
    dir.path().join("nixnav-daemon.sock")
}

#[test]
fn test_search_sends_mode_and_reassembles_chunks() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| {
        Reply::Chunked(search_reply(&[("/p/a.md", false, 7), ("/p/docs", true, 9)], 1234), 5)
    });
    let client = IndexClient::new(&service.path).with_autostart(false);

    let reply = client
        .search(Path::new("/p"), "read", Some("md"), EntryKind::Files, &CancelToken::new())
        .unwrap();
    assert_eq!(reply.entries.len(), 2);
    assert_eq!(reply.total_indexed, 1234);
    assert_eq!(reply.elapsed_ms, 3);
    assert!(reply.entries[1].is_dir);

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(requests[0].strip_prefix("SEARCH ").unwrap()).unwrap();
    assert_eq!(payload["bookmark_path"], "/p");
    assert_eq!(payload["mode"], "gotofile");
    assert_eq!(payload["query"], "read");
    assert_eq!(payload["extension"], "md");
}

#[test]
fn test_connection_reused_across_calls() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |req| match req {
        "PING" => Reply::Line(r#"{"status": "pong"}"#.to_string()),
        _ => Reply::Line(r#"{"files": 10, "trigrams": 20, "bookmarks": 2}"#.to_string()),
    });
    let client = IndexClient::new(&service.path).with_autostart(false);

    assert!(client.ping());
    let stats = client.stats();
    assert!(stats.connected);
    assert_eq!((stats.file_count, stats.term_count, stats.bookmark_count), (10, 20, 2));
    assert!(client.is_connected());
    assert_eq!(service.connection_count(), 1);
    assert_eq!(service.requests(), ["PING", "STATS"]);
}

#[test]
fn test_protocol_error_reconnects_without_relaunch() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("launched");
    let launcher = write_script(dir.path(), "daemon", &format!("touch '{}'", marker.display()));

    let service = FakeService::start(&socket(&dir), |req| {
        if req.contains("broken") {
            Reply::Line("this is not json".to_string())
        } else {
            Reply::Line(search_reply(&[("/p/x", false, 1)], 1))
        }
    });
    let client = IndexClient::new(&service.path).with_service_command(Some(launcher));

    let err = client.search(Path::new("/p"), "broken", None, EntryKind::All, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(!client.is_connected());

    let reply = client.search(Path::new("/p"), "fine", None, EntryKind::All, &CancelToken::new()).unwrap();
    assert_eq!(reply.entries.len(), 1);
    assert_eq!(service.connection_count(), 2);
    assert!(!marker.exists());
}

#[test]
fn test_error_field_is_server_error() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| Reply::Line(r#"{"error": "bookmark not indexed"}"#.to_string()));
    let client = IndexClient::new(&service.path).with_autostart(false);

    let err = client.search_all(&[PathBuf::from("/p")], "", None, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, ClientError::Server(ref msg) if msg == "bookmark not indexed"));
    assert!(!client.is_connected());
}

#[test]
fn test_closed_connection_is_protocol_error() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| Reply::Close);
    let client = IndexClient::new(&service.path).with_autostart(false);

    assert!(matches!(client.rescan(Path::new("/p")), Err(ClientError::Protocol(_))));
    assert!(!client.ping());
}

#[test]
fn test_rescan_and_register() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |req| {
        if req.starts_with("RESCAN ") {
            Reply::Line(r#"{"indexed": 4321}"#.to_string())
        } else {
            Reply::Line(r#"{"status": "ok"}"#.to_string())
        }
    });
    let client = IndexClient::new(&service.path).with_autostart(false);

    assert_eq!(client.rescan(Path::new("/srv/My Docs")).unwrap(), 4321);
    assert!(client.register_bookmark("docs", Path::new("/srv/My Docs"), true));

    let requests = service.requests();
    assert_eq!(requests[0], "RESCAN /srv/My Docs");
    let payload: serde_json::Value =
        serde_json::from_str(requests[1].strip_prefix("ADD_BOOKMARK ").unwrap()).unwrap();
    assert_eq!(payload["name"], "docs");
    assert_eq!(payload["is_network"], true);
}

#[test]
fn test_missing_service_is_unavailable_quickly() {
    let dir = TempDir::new().unwrap();
    let client = IndexClient::new(socket(&dir)).with_autostart(false);

    let started = Instant::now();
    let result = client.search(Path::new("/p"), "x", None, EntryKind::All, &CancelToken::new());
    assert!(matches!(result, Err(ClientError::Unavailable)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!client.stats().connected);
}

#[test]
fn test_autostart_launches_service_once() {
    let dir = TempDir::new().unwrap();
    let path = socket(&dir);
    let marker = dir.path().join("launched");
    let launcher = write_script(dir.path(), "daemon", &format!("touch '{}'", marker.display()));

    // Stand in for the real service: bind the socket once the launcher has run
    let (watch_marker, watch_path) = (marker.clone(), path.clone());
    let server = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !watch_marker.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        FakeService::start(&watch_path, |_| Reply::Line(search_reply(&[("/p/a", false, 1)], 1)))
    });

    let client = IndexClient::new(&path).with_service_command(Some(launcher));
    let reply = client.search(Path::new("/p"), "a", None, EntryKind::All, &CancelToken::new()).unwrap();
    assert_eq!(reply.entries.len(), 1);
    assert!(marker.exists());

    // The launcher's readiness check connects too, but only the search sends a request
    let service = server.join().unwrap();
    assert_eq!(service.requests().len(), 1);
}

#[test]
fn test_bookmark_sync_registers_all() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| Reply::Line(r#"{"status": "ok"}"#.to_string()));

    let bookmarks = vec![Bookmark::new("a", "/x"), Bookmark::new("b", "/y")];
    let handle = spawn_bookmark_sync(service.path.clone(), bookmarks).unwrap();
    assert_eq!(handle.join().unwrap(), 2);

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.starts_with("ADD_BOOKMARK ")));
}

#[test]
fn test_bookmark_sync_without_service() {
    let dir = TempDir::new().unwrap();
    let bookmarks = vec![Bookmark::new("a", "/x"), Bookmark::new("b", "/y")];
    let handle = spawn_bookmark_sync(socket(&dir), bookmarks).unwrap();
    assert_eq!(handle.join().unwrap(), 0);
    assert!(!socket(&dir).exists());
}

#[test]
fn test_missing_newline_times_out_and_drops_connection() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| Reply::Partial(r#"{"results": ["#.to_string()));
    let client = IndexClient::new(&service.path)
        .with_autostart(false)
        .with_default_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let err = client
        .search(Path::new("/p"), "x", None, EntryKind::All, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(t) if t == Duration::from_millis(300)));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!client.is_connected());
}

#[test]
fn test_cancelled_search_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| Reply::Line(search_reply(&[], 0)));
    let client = IndexClient::new(&service.path).with_autostart(false);

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = client.search(Path::new("/p"), "x", None, EntryKind::All, &cancel).unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(service.connection_count(), 0);
    assert!(service.requests().is_empty());
}

#[test]
fn test_cancel_releases_a_stalled_call() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::start(&socket(&dir), |_| Reply::Silent);
    let client = Arc::new(IndexClient::new(&service.path).with_autostart(false));

    // First call holds the connection while the service never answers
    let first = CancelToken::new();
    let (stalled, token) = (Arc::clone(&client), first.clone());
    let worker = thread::spawn(move || stalled.search(Path::new("/p"), "a", None, EntryKind::All, &token));

    thread::sleep(Duration::from_millis(200));
    let second = CancelToken::new();
    let (waiting, token) = (Arc::clone(&client), second.clone());
    let waiter = thread::spawn(move || waiting.search(Path::new("/p"), "b", None, EntryKind::All, &token));

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    second.cancel();
    first.cancel();

    assert!(matches!(worker.join().unwrap(), Err(ClientError::Cancelled)));
    assert!(matches!(waiter.join().unwrap(), Err(ClientError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!client.is_connected());
    // The waiting call gave up before sending its request
    assert_eq!(service.requests().len(), 1);
}
