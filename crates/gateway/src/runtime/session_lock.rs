//! Per-session concurrency control.
//!
//! At most one agent run per session at a time. The WebSocket handler
//! tries to acquire before starting a run and answers `BUSY` when a run
//! is already in flight on that session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use nx_domain::id::SessionId;

/// Manages per-session run locks. Each session maps to a
/// `Semaphore(1)`; holding the permit means a run is in progress.
#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<SessionId, Arc<Semaphore>>>,
}

/// Returned when a run is already in progress for the session.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a run is already in progress for this session")
    }
}

impl std::error::Error for SessionBusy {}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the run lock without waiting. The permit
    /// auto-releases on drop.
    pub fn try_acquire(&self, session: &SessionId) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries for sessions with no run in flight.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}
