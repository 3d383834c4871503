//! # nixnav - bookmark-scoped incremental file finder
//!
//! nixnav finds files under a handful of bookmarked directory roots while you type.
//! Name searches go to a long-lived index service (`nixnav-daemon`) over a Unix
//! socket; when the service is unreachable the same request is answered by
//! spawning `fd` (names) or `rg` (contents) per root.
//!
//! ## Architecture
//!
//! - [`query`] - `bookmark: *.ext term` parsing
//! - [`server`] - index service client, wire protocol, service launch
//! - [`scan`] - request types, fallback scanner, debounced single-flight orchestrator
//! - [`instance`] - single-instance toggle socket
//! - [`tui`] - interactive terminal UI
//! - [`output`] - plain-text result printing
//! - [`utils`] - configuration, bookmarks, logging, mount detection
//!
//! ## Quick Start
//!
//! ```ignore
//! use nixnav::query::parse_query;
//! use nixnav::scan::{EntryKind, ScanOrchestrator, SearchEngine, SearchMode, SearchRequest};
//! use nixnav::utils::AppConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = AppConfig::load().unwrap();
//! let parsed = parse_query("proj: *.md readme", &config.bookmarks);
//! let request = SearchRequest::build(&parsed, &config.bookmarks, None, EntryKind::All, SearchMode::Name);
//!
//! let mut orchestrator = ScanOrchestrator::new(Arc::new(SearchEngine::from_config(&config)));
//! if let Some(results) = orchestrator.run_once(request, Duration::from_secs(60)) {
//!     for entry in &results.entries {
//!         println!("{}", entry.path.display());
//!     }
//! }
//! ```

pub mod instance;
pub mod output;
pub mod query;
pub mod scan;
pub mod server;
#[cfg(feature = "interactive")]
pub mod tui;
pub mod utils;
