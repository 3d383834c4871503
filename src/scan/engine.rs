//! Service-first search execution

use crate::scan::fallback::FallbackScanner;
use crate::scan::orchestrator::{CancelToken, SearchBackend};
use crate::scan::types::{Backend, SearchMode, SearchRequest, SearchResults, SearchScope, sort_by_mtime_desc};
use crate::server::{ClientError, ClientResult, IndexClient, get_socket_path};
use crate::utils::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Runs a request against the index service, falling back to external tools
/// when the service cannot answer.
pub struct SearchEngine {
    client: Arc<IndexClient>,
    fallback: FallbackScanner,
}

impl SearchEngine {
    pub fn new(client: Arc<IndexClient>, fallback: FallbackScanner) -> Self {
        Self { client, fallback }
    }

    /// Engine for the configured environment, launching the service on demand
    pub fn from_config(config: &AppConfig) -> Self {
        let client = IndexClient::new(get_socket_path())
            .with_service_command(config.daemon_command.clone());
        Self::new(Arc::new(client), FallbackScanner::from_config(config))
    }

    pub fn client(&self) -> &Arc<IndexClient> {
        &self.client
    }

    pub fn fallback(&self) -> &FallbackScanner {
        &self.fallback
    }

    fn search_service(&self, request: &SearchRequest, cancel: &CancelToken) -> ClientResult<SearchResults> {
        let extension = request.extension.as_deref();

        let mut reply = match &request.scope {
            SearchScope::Bookmark(target) => {
                let mut reply = self.client.search(&target.root, &request.term, extension, request.kind, cancel)?;
                for entry in &mut reply.entries {
                    entry.origin_bookmark.get_or_insert_with(|| target.bookmark.clone());
                }
                reply
            }
            SearchScope::AllBookmarks(targets) => {
                let roots: Vec<PathBuf> = targets.iter().map(|t| t.root.clone()).collect();
                let mut reply = self.client.search_all(&roots, &request.term, extension, cancel)?;
                // SEARCH_ALL has no mode field
                reply.entries.retain(|e| request.kind.accepts(e.is_dir));
                reply
            }
        };

        sort_by_mtime_desc(&mut reply.entries);
        Ok(SearchResults {
            entries: reply.entries,
            backend: Backend::IndexService,
            total_indexed: reply.total_indexed,
            elapsed: Duration::from_millis(reply.elapsed_ms),
        })
    }
}

impl SearchBackend for SearchEngine {
    fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> SearchResults {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return SearchResults::empty(Backend::Fallback);
        }

        // The service indexes names only
        if request.mode == SearchMode::Name {
            match self.search_service(request, cancel) {
                Ok(results) => return results,
                Err(ClientError::Cancelled) => return SearchResults::empty(Backend::Fallback),
                Err(e) => debug!(error = %e, "index service unavailable, scanning with external tools"),
            }
        }

        if cancel.is_cancelled() {
            return SearchResults::empty(Backend::Fallback);
        }

        let entries = match request.mode {
            SearchMode::Name => self.fallback.scan(request, cancel),
            SearchMode::Content => self.fallback.scan_content(request, cancel),
        };
        SearchResults {
            entries,
            backend: Backend::Fallback,
            total_indexed: 0,
            elapsed: started.elapsed(),
        }
    }
}
