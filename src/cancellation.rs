//! Cooperative cancellation token.
//!
//! Checked between major phases of the per-log pipeline (after parse, after
//! each detector pass) and before I/O boundaries in the file scanners. There
//! is no hard wall-clock timeout on the pipeline itself; only the external
//! extractor invocation in `scanners::archive_scan` has its own deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A handle shared between the scheduler and every worker task.
///
/// Cloning is cheap (an `Arc` bump); all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(ScanError::Cancelled)` if cancellation has been
    /// requested, otherwise `Ok(())`. Call between pipeline phases.
    pub fn check(&self) -> Result<(), crate::error::ScanError> {
        if self.is_cancelled() {
            Err(crate::error::ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}
