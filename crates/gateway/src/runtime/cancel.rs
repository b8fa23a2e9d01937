//! Per-run cancellation tokens.
//!
//! Every agent run gets a `CancelToken` registered under its trace id.
//! Callers (WebSocket disconnects, scheduled-task timeouts, the stop
//! API) signal it; the runner polls at every suspension point and
//! flushes the partial trace as aborted. Multiple cancellations
//! coalesce — the token is a latch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use nx_domain::id::TraceId;

/// A cancellation latch checked by the runtime loop.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Tracks active cancellation tokens per trace.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<TraceId, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new cancel token for a run.
    pub fn register(&self, trace_id: &TraceId) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(trace_id.clone(), token.clone());
        token
    }

    /// Cancel a running trace. Returns true if a token was found.
    pub fn cancel(&self, trace_id: &TraceId) -> bool {
        if let Some(token) = self.tokens.lock().get(trace_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove the token for a run (called when it completes).
    pub fn remove(&self, trace_id: &TraceId) {
        self.tokens.lock().remove(trace_id);
    }

    pub fn is_running(&self, trace_id: &TraceId) -> bool {
        self.tokens.lock().contains_key(trace_id)
    }
}
