use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caller-owned cancellation flag shared with an in-flight operation.
///
/// Checked before every authenticator prompt, before every submission and
/// between receipt polls. A transaction that was already sent is not revoked.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err("cancelled before <stage>")` once the token fired. Callers wrap the
    /// reason in whatever error their step reports.
    pub(crate) fn ensure_active(&self, stage: &str) -> Result<(), String> {
        if self.is_cancelled() {
            return Err(format!("cancelled before {stage}"));
        }
        Ok(())
    }
}
