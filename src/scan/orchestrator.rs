//! Debounced, single-flight search scheduling
//!
//! ```text
//! Idle --query_changed--> Debouncing --tick (due)--> Running --poll_results--> Idle
//!                             ^                         |
//!                             +------query_changed------+  (running worker cancelled)
//! ```
//!
//! Every worker gets a generation number. Results are accepted only when their
//! generation is the one currently running, so a slow superseded search can never
//! overwrite a newer one.

use crate::scan::types::{SearchRequest, SearchResults};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cooperative cancellation flag shared between the orchestrator and a worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes one search request on a worker thread.
///
/// Implementations check `cancel` between expensive steps and must kill any
/// child process they own once it is set.
pub trait SearchBackend: Send + Sync + 'static {
    fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> SearchResults;
}

/// One in-flight search
#[derive(Debug)]
pub struct ScanHandle {
    generation: u64,
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl ScanHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

#[derive(Debug)]
enum ScanState {
    Idle,
    Debouncing { request: SearchRequest, due: Instant },
    Running(ScanHandle),
}

/// Owns the debounce timer and the single active search
pub struct ScanOrchestrator<B: SearchBackend> {
    backend: Arc<B>,
    state: ScanState,
    generation: u64,
    results_tx: Sender<(u64, SearchResults)>,
    results_rx: Receiver<(u64, SearchResults)>,
    /// Cancelled workers that have not exited yet
    detached: Vec<ScanHandle>,
}

impl<B: SearchBackend> ScanOrchestrator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            backend,
            state: ScanState::Idle,
            generation: 0,
            results_tx,
            results_rx,
            detached: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Generation of the most recently started worker (0 before the first)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ScanState::Idle)
    }

    pub fn is_debouncing(&self) -> bool {
        matches!(self.state, ScanState::Debouncing { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ScanState::Running(_))
    }

    /// When the pending debounce fires, if one is pending
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            ScanState::Debouncing { due, .. } => Some(*due),
            _ => None,
        }
    }

    /// Input changed: drop whatever is pending or running and restart the debounce
    pub fn query_changed(&mut self, request: SearchRequest) {
        self.query_changed_at(request, Instant::now());
    }

    pub fn query_changed_at(&mut self, request: SearchRequest, now: Instant) {
        self.cancel();
        let due = now + request.mode.debounce();
        self.state = ScanState::Debouncing { request, due };
    }

    /// Cancel any pending or running search and return to idle
    pub fn cancel(&mut self) {
        match std::mem::replace(&mut self.state, ScanState::Idle) {
            ScanState::Running(handle) => {
                debug!(generation = handle.generation, "superseding running search");
                handle.cancel();
                self.detached.push(handle);
            }
            ScanState::Debouncing { .. } | ScanState::Idle => {}
        }
    }

    /// Start the pending search if its debounce has elapsed.
    /// Returns the generation of the worker started, if any.
    pub fn tick(&mut self) -> Option<u64> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<u64> {
        self.detached.retain(|h| !h.is_finished());

        match &self.state {
            ScanState::Debouncing { due, .. } if *due <= now => {}
            _ => return None,
        }
        let ScanState::Debouncing { request, .. } = std::mem::replace(&mut self.state, ScanState::Idle)
        else {
            return None;
        };

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancelToken::new();

        let backend = Arc::clone(&self.backend);
        let tx = self.results_tx.clone();
        let token = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("search-{}", generation))
            .spawn(move || {
                let results = backend.search(&request, &token);
                if !token.is_cancelled() {
                    let _ = tx.send((generation, results));
                }
            });

        match spawned {
            Ok(thread) => {
                debug!(generation, "search started");
                self.state = ScanState::Running(ScanHandle {
                    generation,
                    cancel,
                    thread,
                });
                Some(generation)
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn search worker");
                None
            }
        }
    }

    /// Collect finished results. Only the running generation is accepted;
    /// everything else is stale and dropped.
    pub fn poll_results(&mut self) -> Option<SearchResults> {
        loop {
            match self.results_rx.try_recv() {
                Ok((generation, results)) => {
                    let current = matches!(
                        &self.state,
                        ScanState::Running(handle) if handle.generation == generation && !handle.is_cancelled()
                    );
                    if !current {
                        debug!(generation, "dropping stale results");
                        continue;
                    }
                    self.state = ScanState::Idle;
                    return Some(results);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Drive one request through debounce and execution, blocking until it is
    /// accepted or `limit` passes.
    pub fn run_once(&mut self, request: SearchRequest, limit: Duration) -> Option<SearchResults> {
        let deadline = Instant::now() + limit;
        self.query_changed(request);

        while Instant::now() < deadline {
            self.tick();
            if let Some(results) = self.poll_results() {
                return Some(results);
            }
            if self.is_idle() {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }

        self.cancel();
        None
    }

    /// Cancel everything and wait up to `wait` for workers to exit.
    /// Workers still running at the deadline are abandoned.
    pub fn shutdown(&mut self, wait: Duration) {
        self.cancel();
        let deadline = Instant::now() + wait;

        while !self.detached.is_empty() {
            self.detached.retain(|h| !h.is_finished());
            if Instant::now() >= deadline {
                warn!(count = self.detached.len(), "abandoning search workers at shutdown");
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        for handle in std::mem::take(&mut self.detached) {
            if handle.is_finished() {
                let _ = handle.thread.join();
            }
        }
    }
}

impl<B: SearchBackend> Drop for ScanOrchestrator<B> {
    fn drop(&mut self) {
        self.cancel();
    }
}
