//! One-way protocol logging switch.
//!
//! Each session type (server, client) shares one gate. The gate starts
//! open; the first event observed after the cutoff is still logged and
//! then closes the gate for good. Only `reset` reopens it, which callers
//! do between independent runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default cutoff after which protocol events stop being logged.
pub const DEFAULT_LOG_CUTOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LogGate {
    open: Arc<AtomicBool>,
    cutoff: Duration,
}

impl LogGate {
    pub fn new(cutoff: Duration) -> Self {
        Self {
            open: Arc::new(AtomicBool::new(true)),
            cutoff,
        }
    }

    /// Should an event at `now` be logged? Closes the gate once `now`
    /// passes the cutoff.
    pub fn observe(&self, now: Duration) -> bool {
        if !self.open.load(Ordering::Relaxed) {
            return false;
        }
        if now > self.cutoff {
            self.open.store(false, Ordering::Relaxed);
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.open.store(true, Ordering::Relaxed);
    }
}

impl Default for LogGate {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CUTOFF)
    }
}
