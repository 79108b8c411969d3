//! Cooperative cancellation for blocking analyzer work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag polled by analyzers between frames.
///
/// A `spawn_blocking` task keeps running after the future awaiting it is
/// dropped; the analyzers check this flag so they stop early instead.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    stopped: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Guard that cancels the flag when dropped.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop { flag: self.clone() }
    }
}

/// Cancels its flag on drop.
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: CancelFlag,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.flag.cancel();
    }
}
