//! Progress-callback trait for per-file conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as [`crate::convert_batch`] works through its files. Files are
//! processed one after another, so callbacks are never invoked concurrently
//! for the same batch.
//!
//! # Example
//!
//! ```rust
//! use pdf_stitch::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, name: &str, pages: usize) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} → {} page(s)", index + 1, total, name, pages);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { converted: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch converter as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 0-based.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file is converted.
    fn on_file_start(&self, index: usize, total_files: usize, name: &str) {
        let _ = (index, total_files, name);
    }

    /// Called when a file converted successfully.
    ///
    /// # Arguments
    /// * `page_count` — pages the file contributed to the output
    fn on_file_complete(&self, index: usize, total_files: usize, name: &str, page_count: usize) {
        let _ = (index, total_files, name, page_count);
    }

    /// Called when a file failed; the batch carries on with the next one.
    fn on_file_error(&self, index: usize, total_files: usize, name: &str, error: &str) {
        let _ = (index, total_files, name, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: Mutex<Vec<String>>,
        successes: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_file_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _name: &str, _pages: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, name: &str, _error: &str) {
            self.errors.lock().unwrap().push(name.to_string());
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.successes.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(0, 2, "a.jpg");
        cb.on_file_complete(0, 2, "a.jpg", 1);
        cb.on_file_error(1, 2, "b.doc", "unsupported");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_file_start(0, 2, "a.jpg");
        tracker.on_file_complete(0, 2, "a.jpg", 1);
        tracker.on_file_start(1, 2, "b.doc");
        tracker.on_file_error(1, 2, "b.doc", "unsupported");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.errors.lock().unwrap(), vec!["b.doc".to_string()]);
        assert_eq!(tracker.successes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_file_complete(0, 1, "x.png", 1);
    }
}
