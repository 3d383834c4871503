//! Search execution: request types, the service-first engine, the external-tool
//! fallback, and the debounced orchestrator that schedules them.

pub mod engine;
pub mod fallback;
pub mod orchestrator;
mod types;

pub use engine::SearchEngine;
pub use fallback::FallbackScanner;
pub use orchestrator::{CancelToken, ScanHandle, ScanOrchestrator, SearchBackend};
pub use types::{
    Backend, ContentMatch, EntryKind, ResultEntry, SearchMode, SearchRequest, SearchResults,
    SearchScope, Target, sort_by_mtime_desc,
};
