//! Error types for the pdftoc library.
//!
//! Only *fatal* conditions live in [`TocError`] — situations where an
//! operation cannot produce a result at all (bad input file, malformed page
//! range, merge called with nothing to merge, outline build that filtered
//! every entry away).
//!
//! Everything softer is deliberately kept out of this enum: a model reply
//! that fails to parse, an entry missing a field, or a flaky API call is
//! recorded as a human-readable string inside
//! [`crate::pipeline::PipelineState::errors`] or
//! [`crate::model::ValidationResult`], so a single bad page degrades to an
//! empty (or partial) page instead of aborting the document.
//!
//! The one place where soft problems can become hard stops is
//! [`crate::pdf::write_outline_safely`]: unacknowledged warnings block the
//! write unless the caller forces it, while errors always block.

use std::path::PathBuf;
use thiserror::Error;

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// All fatal errors returned by the pdftoc library.
#[derive(Debug, Error)]
pub enum TocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A page-range argument such as "7-10" could not be parsed.
    ///
    /// Range input is never silently coerced; a malformed range is fatal
    /// at input-validation time.
    #[error("Invalid page range '{input}': {reason}\nExpected the form START-END, e.g. '7-10'.")]
    InvalidPageRange { input: String, reason: String },

    /// The page offset must map book page 1 onto a real PDF page.
    #[error("Invalid page offset {value}: must be >= 1 (PDF page of the book's page 1)")]
    InvalidOffset { value: i64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model API call failed (transport, timeout, or API-side error).
    ///
    /// Inside the page pipeline this is caught per-stage and recorded; it
    /// only surfaces as `Err` from direct [`crate::client::ModelClient`]
    /// calls.
    #[error("Model call failed: {message}")]
    Model { message: String },

    // ── Data errors ───────────────────────────────────────────────────────
    /// A TOC entry failed its construction invariants (empty title, level
    /// outside 1..=5). Callers wanting repair-not-reject semantics clamp
    /// before constructing.
    #[error("Invalid TOC entry: {0}")]
    InvalidEntry(String),

    /// Merge was called with zero pages.
    #[error("No TOC pages to merge")]
    EmptyMerge,

    /// Outline building filtered out every entry; nothing can be written.
    #[error("No writable outline entries after filtering (check the page offset and page range)")]
    NoWritableEntries,

    /// Text import found no parseable TOC lines.
    #[error("No TOC entries could be parsed from '{path}'")]
    EmptyTextImport { path: PathBuf },

    // ── Write errors ──────────────────────────────────────────────────────
    /// Pre-write validation found blocking problems; force never overrides
    /// these.
    #[error("Outline write refused:\n{}", bullet_list(.errors))]
    WriteRefused { errors: Vec<String> },

    /// Pre-write validation produced warnings and the caller did not force.
    #[error("Outline write blocked by {} warning(s); pass force=true to override:\n{}",
            .warnings.len(), bullet_list(.warnings))]
    WriteBlocked { warnings: Vec<String> },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_range_display() {
        let e = TocError::InvalidPageRange {
            input: "10-7".into(),
            reason: "start must be <= end".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("10-7"), "got: {msg}");
        assert!(msg.contains("START-END"));
    }

    #[test]
    fn write_blocked_lists_warnings() {
        let e = TocError::WriteBlocked {
            warnings: vec![
                "PDF already has an outline".into(),
                "page 12000 looks implausible".into(),
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("2 warning(s)"));
        assert!(msg.contains("already has an outline"));
    }

    #[test]
    fn page_out_of_range_display() {
        let e = TocError::PageOutOfRange { page: 40, total: 30 };
        assert!(e.to_string().contains("40"));
        assert!(e.to_string().contains("30 pages"));
    }
}
