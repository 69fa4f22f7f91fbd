//! Background search engine.
//!
//! An owned handle to a dedicated worker thread. The caller talks to the
//! worker only through message passing: commands in, progress/results out.
//! One search runs at a time; accepting a new search (or an abort) while
//! one is running cancels it first — last query wins, and a superseded run
//! never emits results.

pub mod eval;
pub mod query;

use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use lru::LruCache;
use tracing::{debug, error, warn};

use crate::config::SearchConfig;
use crate::model::MessageBoundary;
use crate::source::ByteSource;

use self::eval::{evaluate, MessageFields};
use self::query::Query;

/// Events emitted by the worker for one accepted search.
///
/// Exactly one terminal event (`Results`, `Cancelled`, or `Error`) is sent
/// per accepted search; `Progress` values are non-decreasing before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// Percentage of messages evaluated so far, 0..=100.
    Progress(u8),
    /// Matching boundary indices, sorted ascending.
    Results(Vec<u32>),
    /// The run was cancelled (aborted or superseded). Not a failure.
    Cancelled,
    /// The run failed as a whole.
    Error(String),
}

enum Command {
    Search {
        boundaries: Arc<Vec<MessageBoundary>>,
        query_text: String,
        events: Sender<SearchEvent>,
    },
    Abort,
    Shutdown,
}

/// Handle to the search worker thread.
///
/// Dropping the handle shuts the worker down deterministically (any
/// running search reports `Cancelled` first).
pub struct SearchEngine {
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl SearchEngine {
    /// Start a worker for the given source.
    ///
    /// The source is shared read-only with the worker; there are no
    /// writers, so no locking beyond the source's own handle is needed.
    pub fn spawn(source: Arc<dyn ByteSource>, config: SearchConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = std::thread::spawn(move || worker_loop(source, config, rx));
        Self {
            commands: tx,
            worker: Some(worker),
        }
    }

    /// Dispatch a search, superseding any running one.
    ///
    /// Returns the event stream for this search. A query with no filter or
    /// free-text tokens dispatches nothing: the engine stays idle (any
    /// prior search is still cancelled) and the returned stream ends
    /// immediately.
    pub fn search(
        &self,
        boundaries: Arc<Vec<MessageBoundary>>,
        query_text: impl Into<String>,
    ) -> Receiver<SearchEvent> {
        let query_text = query_text.into();
        let (tx, rx) = mpsc::channel();

        if Query::parse(&query_text).is_none() {
            debug!("empty query, clearing search");
            self.abort();
            return rx; // sender dropped: stream ends with no events
        }

        let _ = self.commands.send(Command::Search {
            boundaries,
            query_text,
            events: tx,
        });
        rx
    }

    /// Cancel the running search, if any, without starting a new one.
    pub fn abort(&self) {
        let _ = self.commands.send(Command::Abort);
    }
}

impl Drop for SearchEngine {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(source: Arc<dyn ByteSource>, config: SearchConfig, commands: Receiver<Command>) {
    let cache_size = NonZeroUsize::new(config.body_cache_size).unwrap_or(NonZeroUsize::MIN);
    let mut body_cache: LruCache<u64, String> = LruCache::new(cache_size);

    // A command that superseded the previous run, carried into the next
    // loop iteration.
    let mut pending: Option<Command> = None;

    loop {
        let command = match pending.take() {
            Some(cmd) => cmd,
            None => match commands.recv() {
                Ok(cmd) => cmd,
                Err(_) => return, // handle dropped
            },
        };

        match command {
            Command::Shutdown => return,
            Command::Abort => {} // nothing running
            Command::Search {
                boundaries,
                query_text,
                events,
            } => {
                let guard = events.clone();
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    run_search(
                        source.as_ref(),
                        &config,
                        &mut body_cache,
                        &boundaries,
                        &query_text,
                        &events,
                        &commands,
                    )
                }));
                pending = match outcome {
                    Ok(next) => next,
                    Err(_) => {
                        error!("search worker panicked");
                        let _ = guard.send(SearchEvent::Error(
                            "internal error: search panicked".to_string(),
                        ));
                        None
                    }
                };
            }
        }
    }
}

/// Evaluate one search. Returns a superseding command observed mid-run,
/// if any, for the worker loop to handle next.
fn run_search(
    source: &dyn ByteSource,
    config: &SearchConfig,
    body_cache: &mut LruCache<u64, String>,
    boundaries: &[MessageBoundary],
    query_text: &str,
    events: &Sender<SearchEvent>,
    commands: &Receiver<Command>,
) -> Option<Command> {
    let Some(query) = Query::parse(query_text) else {
        return None; // defensive: search() already filters empty queries
    };
    let needs_body = query.needs_body();
    let needs_attachment = query.needs_attachment_scan();

    let total = boundaries.len();
    let mut matches: Vec<u32> = Vec::new();
    let mut last_percent: u8 = 0;
    let _ = events.send(SearchEvent::Progress(0));

    for (i, boundary) in boundaries.iter().enumerate() {
        // Cancellation checkpoint: a queued command supersedes this run.
        match commands.try_recv() {
            Ok(cmd) => {
                debug!(processed = i, total, "search superseded");
                let _ = events.send(SearchEvent::Cancelled);
                return match cmd {
                    Command::Abort => None,
                    other => Some(other),
                };
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                let _ = events.send(SearchEvent::Cancelled);
                return Some(Command::Shutdown);
            }
        }

        match MessageFields::load(
            source,
            boundary,
            needs_body,
            needs_attachment,
            config.header_read_limit,
            body_cache,
        ) {
            Ok(fields) => {
                if evaluate(&query, &fields) {
                    matches.push(boundary.index);
                }
            }
            Err(e) => {
                // One unreadable message never aborts the whole search
                warn!(index = boundary.index, error = %e, "skipping unreadable message");
            }
        }

        let done = i + 1;
        let percent = ((done * 100) / total.max(1)).min(100) as u8;
        let at_interval = done % config.progress_interval.max(1) == 0 || done == total;
        if at_interval && percent > last_percent {
            last_percent = percent;
            let _ = events.send(SearchEvent::Progress(percent));
        }
    }

    // Indices are unique by construction; sort explicitly so callers can
    // rely on ascending order even if evaluation order ever changes.
    matches.sort_unstable();
    let _ = events.send(SearchEvent::Results(matches));
    None
}
