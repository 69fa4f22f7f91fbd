//! Cooperative cancellation token.
//!
//! A [`CancelToken`] is a cheap, cloneable flag shared between the caller
//! and a long-running operation. The operation polls it at well-defined
//! checkpoints (each chunk during a scan, each message during a search);
//! cancellation is never preemptive and takes effect within one checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag polled by the scanner and the search worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
