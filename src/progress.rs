//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as page pipelines run. Callbacks are the least-invasive
//! integration point: the CLI forwards them to a terminal progress bar, a
//! server could forward them to a WebSocket, and the library stays unaware
//! of either.
//!
//! Implementations must be `Send + Sync`: in concurrent mode the per-page
//! events fire from different tasks, possibly simultaneously.

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each TOC page image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after the page range is known and rendered.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's pipeline starts.
    ///
    /// `page_num` is the 1-based PDF page number, not an index.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page pipeline settles with usable entries.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, entries: usize) {
        let _ = (page_num, total_pages, entries);
    }

    /// Called when a page pipeline settles with errors (the page still
    /// contributes whatever partial entries it produced).
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page pipeline has settled.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in
/// [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
