//! Progress-callback trait for per-image fetch events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::ReportConfigBuilder::progress_callback`] to receive
//! events while the fetcher works through the image links. Downloads are the
//! only slow phase of a run (up to `attempts × timeout` per image), so they
//! are the only phase that reports progress.
//!
//! # Example
//!
//! ```rust
//! use heritage_report::{ReportConfig, ReportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ReportProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, n: usize, total: usize, bytes: u64) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {n}/{total}: {bytes} bytes");
//!     }
//! }
//!
//! let config = ReportConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the fetcher as it processes each image locator.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Image numbers are 1-indexed within one
/// `fetch_all` batch.
pub trait ReportProgressCallback: Send + Sync {
    /// Called once before the first image of a batch.
    fn on_fetch_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called before an image is requested (or served from cache).
    fn on_image_start(&self, image_num: usize, total_images: usize, name_hint: &str) {
        let _ = (image_num, total_images, name_hint);
    }

    /// Called when an image was stored and validated.
    fn on_image_complete(&self, image_num: usize, total_images: usize, byte_size: u64) {
        let _ = (image_num, total_images, byte_size);
    }

    /// Called when an image failed after every attempt.
    fn on_image_error(&self, image_num: usize, total_images: usize, error: &str) {
        let _ = (image_num, total_images, error);
    }

    /// Called once after every image of the batch was attempted.
    fn on_fetch_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReportConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;
