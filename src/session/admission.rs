//! Single-session admission control.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Process-wide gate that lets at most one shell session run.
///
/// Busy means reject, never queue. The lock is only held for the
/// check-and-set, never across an await point.
#[derive(Debug, Default)]
pub struct SessionGate {
    held: Mutex<bool>,
}

impl SessionGate {
    /// Create a gate with a free slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, bool> {
        // A panic while holding the guard cannot leave the bool half-written.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the slot if it is free. Never blocks.
    ///
    /// The returned permit frees the slot when dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SessionPermit> {
        let mut held = self.slot();
        if *held {
            debug!("admission: slot busy");
            return None;
        }
        *held = true;
        debug!("admission: slot acquired");
        Some(SessionPermit {
            gate: Arc::clone(self),
        })
    }

    /// Whether a session currently holds the slot.
    pub fn is_held(&self) -> bool {
        *self.slot()
    }

    fn release(&self) {
        *self.slot() = false;
        debug!("admission: slot released");
    }
}

/// Proof of holding the admission slot.
#[derive(Debug)]
pub struct SessionPermit {
    gate: Arc<SessionGate>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
