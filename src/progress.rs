//! Progress-callback trait for per-exam batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each exam. Callers can
//! forward events to a terminal progress bar, a channel, or a log without
//! the library knowing anything about how the host application reports.

use std::sync::Arc;

/// Called by the batch pipeline as it processes each exam.
///
/// Implementations must be `Send + Sync`: exams are processed concurrently
/// by the worker pool, so `on_exam_start`, `on_exam_complete`, and
/// `on_exam_error` may be called from different tasks at once. Protect
/// shared mutable state with `Mutex` or atomics. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before any exam is processed.
    fn on_batch_start(&self, total_exams: usize) {
        let _ = total_exams;
    }

    /// Called when a worker picks up an exam.
    fn on_exam_start(&self, filename: String, total_exams: usize) {
        let _ = (filename, total_exams);
    }

    /// Called when an exam finishes, even with some pages skipped.
    ///
    /// `rows` is the number of question rows written to the per-exam CSV.
    fn on_exam_complete(&self, filename: String, total_exams: usize, rows: usize) {
        let _ = (filename, total_exams, rows);
    }

    /// Called when a whole exam is skipped (unreadable PDF).
    ///
    /// The error is passed by value so the callback stays `Send` when
    /// moved into spawned tasks.
    fn on_exam_error(&self, filename: String, total_exams: usize, error: String) {
        let _ = (filename, total_exams, error);
    }

    /// Called once after every exam has been attempted, before the
    /// combined CSV is written.
    fn on_batch_complete(&self, total_exams: usize, processed: usize) {
        let _ = (total_exams, processed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        rows: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_exam_start(&self, _filename: String, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_exam_complete(&self, _filename: String, _total: usize, rows: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.rows.fetch_add(rows, Ordering::SeqCst);
        }

        fn on_exam_error(&self, _filename: String, _total: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_exam_start("a.pdf".into(), 3);
        cb.on_exam_complete("a.pdf".into(), 3, 12);
        cb.on_exam_error("b.pdf".into(), 3, "unreadable".into());
        cb.on_batch_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            rows: AtomicUsize::new(0),
        };

        tracker.on_exam_start("a.pdf".into(), 2);
        tracker.on_exam_complete("a.pdf".into(), 2, 7);
        tracker.on_exam_start("b.pdf".into(), 2);
        tracker.on_exam_error("b.pdf".into(), 2, "corrupt".into());

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.rows.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn callback_moves_into_spawned_task() {
        let cb: Arc<dyn BatchProgressCallback> = Arc::new(NoopProgressCallback);
        std::thread::spawn(move || {
            cb.on_exam_error(
                "exam.pdf".into(),
                5,
                "LLM call failed after 3 retries".into(),
            );
        })
        .join()
        .expect("spawned thread must not panic");
    }
}
