//! Progress-callback trait for extraction stage events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to be told
//! when each stage of the single-document pipeline starts and finishes. The
//! model request usually dominates wall-clock time, so a spinner driven by
//! these events is enough feedback for a terminal user.
//!
//! # Example
//!
//! ```rust
//! use edgequake_statement::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ExtractionProgressCallback for Log {
//!     fn on_parse_complete(&self, records: usize, dropped: usize) {
//!         eprintln!("{records} transactions ({dropped} lines dropped)");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because
/// rendering runs on a blocking worker thread.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before rasterisation.
    ///
    /// # Arguments
    /// * `selected_pages`: pages that will be rendered
    /// * `total_pages`: pages in the document
    fn on_render_start(&self, selected_pages: usize, total_pages: usize) {
        let _ = (selected_pages, total_pages);
    }

    /// Called after every selected page has been rendered and PNG-encoded.
    fn on_render_complete(&self, rendered_pages: usize, duration_ms: u64) {
        let _ = (rendered_pages, duration_ms);
    }

    /// Called just before the extraction request is sent.
    ///
    /// # Arguments
    /// * `images`: number of page images attached to the request
    fn on_request_start(&self, images: usize) {
        let _ = images;
    }

    /// Called when the model reply arrives.
    ///
    /// # Arguments
    /// * `reply_len`: byte length of the reply text
    /// * `duration_ms`: request round-trip time
    fn on_request_complete(&self, reply_len: usize, duration_ms: u64) {
        let _ = (reply_len, duration_ms);
    }

    /// Called once the reply has been parsed into records.
    fn on_parse_complete(&self, records: usize, dropped: usize) {
        let _ = (records, dropped);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
