//! # pdftoc
//!
//! Add a table of contents to scanned PDFs using Vision Language Models.
//!
//! ## Why this crate?
//!
//! Scanned books have no embedded text, so their PDFs have no outline —
//! navigating a 600-page scan means scrubbing through thumbnails. The TOC
//! is right there on pages 5–12, though, printed for humans. This crate
//! rasterises those pages, lets a VLM read them, coerces the model's
//! free-form replies into structured entries, reconciles the per-page
//! results into one consistent outline, and writes it back into the PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + page range + offset
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Render    rasterise the TOC pages via pdfium (spawn_blocking)
//!  ├─ 3. Recognise per page: analyze → transcribe → parse → validate,
//!  │                with tolerant JSON recovery and per-page retries
//!  ├─ 4. Merge     filter, globally sort by page, sanity-check
//!  └─ 5. Write     repair levels, apply the page offset, set the outline
//! ```
//!
//! Model replies are treated as hostile input: fenced, prose-wrapped,
//! truncated, and comma-dangling JSON all flow through [`recover`] before
//! anything downstream sees them, and schema near-misses are repaired (not
//! rejected) by [`validate`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdftoc::{extract_toc, write_outline_safely, ExtractionConfig, PageRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let range = PageRange::parse("7-10")?;
//!
//!     let output = extract_toc("book.pdf", range, 15, &config).await?;
//!     eprintln!("{} entries recognised", output.merged.toc.len());
//!
//!     write_outline_safely(
//!         std::path::Path::new("book.pdf"),
//!         &output.merged,
//!         Some(std::path::Path::new("book_with_toc.pdf")),
//!         false,
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftoc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdftoc = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod merge;
pub mod model;
pub mod outline;
pub mod pdf;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recover;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ModelClient, VisionLlmClient};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageRange};
pub use error::TocError;
pub use export::{export_toc_to_text, import_toc_from_text_file, parse_toc_from_text};
pub use extract::{extract_toc, extract_toc_with_client, ExtractionOutput, ExtractionStats};
pub use merge::{merge_pages, validate_merged, MergedReport};
pub use model::{MergedToc, TocEntry, TocMetadata, TocPage, ValidationResult, ValidationStatus};
pub use outline::{build_outline, OutlineRow};
pub use pdf::{existing_outline, has_outline, write_outline_safely};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use validate::validate;
