use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Advisory cancellation flag shared between a task and whoever owns it.
///
/// Cancellation is cooperative: setting the flag never interrupts work, it is
/// only observed when the task checks it at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
