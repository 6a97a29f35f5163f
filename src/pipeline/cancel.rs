// Cooperative cancellation shared between the caller and a running job.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CompressError;

/// Cooperative cancellation token wrapping an `AtomicBool`.
///
/// Clones share the same flag. Per-page loops call [`check`](Self::check)
/// at the top of every iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(CompressError::Cancelled)
        } else {
            Ok(())
        }
    }
}
