//! Collection point for diagnostics raised by parallel build stages.

use crate::code::DiagnosticCode;
use crate::diagnostic::Diagnostic;
use crate::severity::Severity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Collects diagnostics from any thread.
///
/// Every emitted diagnostic is also logged through `tracing`: errors at
/// `error`, warnings at `warn`, notes and help at `debug`. Counts per
/// severity are kept outside the lock and survive
/// [`take_all`](Self::take_all). A poisoned lock is recovered, so emitting
/// never panics.
#[derive(Default)]
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    counts: [AtomicUsize; 4],
}

impl DiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records `diag` and logs it.
    pub fn emit(&self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => {
                tracing::error!(code = %diag.code, location = ?diag.location, "{}", diag.message)
            }
            Severity::Warning => {
                tracing::warn!(code = %diag.code, location = ?diag.location, "{}", diag.message)
            }
            Severity::Note | Severity::Help => {
                tracing::debug!(code = %diag.code, location = ?diag.location, "{}", diag.message)
            }
        }
        self.counts[diag.severity.index()].fetch_add(1, Ordering::Relaxed);
        self.lock().push(diag);
    }

    /// Returns `true` if an error was emitted.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Number of errors emitted so far.
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    /// Number of diagnostics of `severity` emitted so far.
    pub fn count(&self, severity: Severity) -> usize {
        self.counts[severity.index()].load(Ordering::Relaxed)
    }

    /// The most serious severity emitted so far.
    pub fn worst(&self) -> Option<Severity> {
        Severity::ALL
            .into_iter()
            .rev()
            .find(|severity| self.count(*severity) > 0)
    }

    /// Returns `true` if a diagnostic with `code` is currently held.
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.lock().iter().any(|diag| diag.code == code)
    }

    /// Takes the held diagnostics, leaving the sink empty.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.lock())
    }

    /// A copy of the held diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn overflow() -> Diagnostic {
        Diagnostic::error(DiagnosticCode::SINGLE_DEX_OVERFLOW, "too many method ids")
    }

    fn corrupt_state() -> Diagnostic {
        Diagnostic::warning(DiagnosticCode::CORRUPT_INCREMENTAL_STATE, "bad types.deps")
    }

    #[test]
    fn empty_sink() {
        let sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        assert_eq!(sink.worst(), None);
        assert!(sink.take_all().is_empty());
    }

    #[test]
    fn counts_by_severity() {
        let sink = DiagnosticSink::new();
        sink.emit(corrupt_state());
        assert!(!sink.has_errors());
        assert_eq!(sink.worst(), Some(Severity::Warning));
        sink.emit(overflow());
        sink.emit(Diagnostic::note(DiagnosticCode::LIBRARY_CHANGED, "rebuild"));
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.count(Severity::Warning), 1);
        assert_eq!(sink.count(Severity::Note), 1);
        assert_eq!(sink.worst(), Some(Severity::Error));
    }

    #[test]
    fn take_all_drains_but_keeps_counts() {
        let sink = DiagnosticSink::new();
        sink.emit(overflow());
        sink.emit(corrupt_state());
        assert!(sink.contains(DiagnosticCode::CORRUPT_INCREMENTAL_STATE));
        assert_eq!(sink.take_all().len(), 2);
        assert!(sink.take_all().is_empty());
        assert!(!sink.contains(DiagnosticCode::CORRUPT_INCREMENTAL_STATE));
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn concurrent_emitters() {
        let sink = Arc::new(DiagnosticSink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        sink.emit(overflow());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.error_count(), 400);
        assert_eq!(sink.diagnostics().len(), 400);
    }

    #[test]
    fn survives_poisoned_lock() {
        let sink = Arc::new(DiagnosticSink::new());
        let cloned = Arc::clone(&sink);
        let _ = std::thread::spawn(move || {
            let _guard = cloned.diagnostics.lock().unwrap();
            panic!("poison the sink");
        })
        .join();

        sink.emit(corrupt_state());
        assert_eq!(sink.diagnostics().len(), 1);
    }
}
