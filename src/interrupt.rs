//! Cooperative cancellation for the scan.
//!
//! A single atomic flag plus a stored first cause. Workers poll the flag
//! between work units and at I/O boundaries; no thread interruption
//! primitives are involved. The first terminal failure wins; later failures
//! are attached to it as suppressed context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::ScanError;

/// Cooperative cancellation token shared by every phase of one scan.
///
/// # Thread safety
///
/// All operations are safe to call concurrently. `is_tripped` is a single
/// relaxed-acquire load and is cheap enough for per-unit polling.
pub struct InterruptionMonitor {
    tripped: AtomicBool,
    cause: Mutex<Option<ScanError>>,
}

impl InterruptionMonitor {
    pub fn new() -> Self {
        Self {
            tripped: AtomicBool::new(false),
            cause: Mutex::new(None),
        }
    }

    /// Returns whether the monitor has tripped.
    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Requests cancellation with no specific cause.
    pub fn cancel(&self) {
        self.trip(ScanError::cancelled());
    }

    /// Records a terminal failure.
    ///
    /// The first call stores the cause and trips the flag; later calls attach
    /// their failure to the stored cause as a suppressed entry.
    pub fn trip(&self, err: ScanError) {
        let mut cause = self.cause.lock().expect("interruption cause poisoned");
        match cause.as_mut() {
            None => {
                *cause = Some(err);
                self.tripped.store(true, Ordering::Release);
            }
            Some(first) => first.suppress(err.to_string()),
        }
    }

    /// Cooperative checkpoint.
    ///
    /// Returns the recorded cause (cloned) once the monitor has tripped, so
    /// callers can fail fast at phase and I/O boundaries.
    pub fn check(&self) -> Result<(), ScanError> {
        if !self.is_tripped() {
            return Ok(());
        }
        let cause = self.cause.lock().expect("interruption cause poisoned");
        Err(cause.clone().unwrap_or_else(ScanError::cancelled))
    }

    /// Takes the recorded cause, leaving the flag tripped.
    pub fn take_cause(&self) -> Option<ScanError> {
        self.cause
            .lock()
            .expect("interruption cause poisoned")
            .take()
    }
}

impl Default for InterruptionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_wins_and_later_failures_are_suppressed() {
        let monitor = InterruptionMonitor::new();
        assert!(monitor.check().is_ok());

        monitor.trip(ScanError::worker("first"));
        monitor.trip(ScanError::worker("second"));
        monitor.trip(ScanError::worker("third"));

        let err = monitor.check().expect_err("monitor tripped");
        assert!(err.to_string().contains("first"));
        assert_eq!(err.suppressed().len(), 2);
    }

    #[test]
    fn cancel_records_cancellation() {
        let monitor = InterruptionMonitor::new();
        monitor.cancel();
        assert!(monitor.is_tripped());
        assert!(monitor.check().expect_err("tripped").is_cancelled());
    }
}
