//! Core data types: TOC entries, per-page results, validation outcomes,
//! and the merged document TOC.
//!
//! Two JSON artifact formats are produced by this crate and both are
//! defined here, next to the types they serialise:
//!
//! * **Per-page file** (`page_N.json`) — a bare JSON array of
//!   `{title, page, level}` objects, pretty-printed UTF-8.
//! * **Merged file** (`toc_merged.json`) — `{"metadata": {...}, "toc": [...]}`.
//!
//! [`TocEntry::new`] is a *validating* constructor: an empty title or a
//! level outside `1..=5` is rejected with [`TocError::InvalidEntry`].
//! Repair-not-reject semantics belong to [`crate::validate`], which clamps
//! fields *before* construction.

use crate::error::TocError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lowest heading level an entry may carry.
pub const MIN_LEVEL: u8 = 1;
/// Deepest heading level an entry may carry.
pub const MAX_LEVEL: u8 = 5;

/// A single table-of-contents entry.
///
/// `page` is the page number *as printed in the book*, before any offset
/// is applied; it may legitimately differ from the PDF page index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub page: i64,
    pub level: u8,
}

impl TocEntry {
    /// Construct an entry, trimming the title and enforcing invariants.
    ///
    /// # Errors
    /// [`TocError::InvalidEntry`] if the trimmed title is empty or the
    /// level is outside `1..=5`.
    pub fn new(title: impl Into<String>, page: i64, level: u8) -> Result<Self, TocError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(TocError::InvalidEntry("title must be non-empty".into()));
        }
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(TocError::InvalidEntry(format!(
                "level must be {MIN_LEVEL}-{MAX_LEVEL}, got {level}"
            )));
        }
        Ok(Self { title, page, level })
    }

    /// Map the printed page number to the PDF page number.
    ///
    /// `offset` is the PDF page on which the book's page 1 appears, so
    /// printed page 1 with offset 15 lands on PDF page 15.
    pub fn apply_offset(&self, offset: i64) -> i64 {
        self.page + (offset - 1)
    }
}

/// All entries recognised on one TOC page image.
///
/// Created once per processed image after its pipeline run settles;
/// immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct TocPage {
    /// 1-based PDF page number the image was rendered from.
    pub page_number: u32,
    pub entries: Vec<TocEntry>,
    /// Path of the rendered image this page was recognised from, if any.
    pub source_image: Option<PathBuf>,
}

impl TocPage {
    pub fn new(page_number: u32, entries: Vec<TocEntry>) -> Self {
        Self {
            page_number,
            entries,
            source_image: None,
        }
    }

    /// Write the per-page artifact: a bare JSON array of entries.
    pub fn save_json(&self, path: &Path) -> Result<(), TocError> {
        let body = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| TocError::Internal(format!("serialise page {}: {e}", self.page_number)))?;
        std::fs::write(path, body).map_err(|e| TocError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load a per-page artifact written by [`TocPage::save_json`].
    pub fn load_json(path: &Path, page_number: u32) -> Result<Self, TocError> {
        let body = std::fs::read_to_string(path).map_err(|_| TocError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let entries: Vec<TocEntry> = serde_json::from_str(&body)
            .map_err(|e| TocError::Internal(format!("parse {}: {e}", path.display())))?;
        Ok(Self::new(page_number, entries))
    }
}

/// Outcome classification of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Every entry was well-formed as-is.
    Valid,
    /// Entries needed clamping/correction but none were dropped for errors.
    ValidWithFixes,
    /// At least one entry was structurally broken and dropped.
    Invalid,
}

/// Result of validating one page's raw entries.
///
/// `status` is `Invalid` iff `errors` is non-empty, and `ValidWithFixes`
/// iff errors are empty but warnings are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    /// Successfully repaired entries, in original order.
    pub data: Vec<TocEntry>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// True unless the status is [`ValidationStatus::Invalid`].
    pub fn is_usable(&self) -> bool {
        self.status != ValidationStatus::Invalid
    }
}

/// Metadata attached to a merged TOC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocMetadata {
    pub pdf_path: String,
    /// PDF page on which the book's printed page 1 appears (>= 1).
    pub page_offset: i64,
    pub total_entries: usize,
    /// RFC 3339 timestamp of when the merge was produced.
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toc_page_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl TocMetadata {
    pub fn new(pdf_path: impl Into<String>, page_offset: i64, total_entries: usize) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            page_offset,
            total_entries,
            generated_at: chrono::Utc::now().to_rfc3339(),
            toc_page_range: None,
            model_name: None,
        }
    }
}

/// The merged, globally page-sorted document TOC.
///
/// Built exactly once by [`crate::merge::merge_pages`], optionally
/// persisted, then consumed by [`crate::outline::build_outline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedToc {
    pub metadata: TocMetadata,
    pub toc: Vec<TocEntry>,
}

impl MergedToc {
    /// Write the merged artifact (`{"metadata": ..., "toc": [...]}`).
    pub fn save_json(&self, path: &Path) -> Result<(), TocError> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| TocError::Internal(format!("serialise merged TOC: {e}")))?;
        std::fs::write(path, body).map_err(|e| TocError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load a merged artifact written by [`MergedToc::save_json`].
    pub fn load_json(path: &Path) -> Result<Self, TocError> {
        let body = std::fs::read_to_string(path).map_err(|_| TocError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        serde_json::from_str(&body)
            .map_err(|e| TocError::Internal(format!("parse {}: {e}", path.display())))
    }

    /// All entries at the given level.
    pub fn entries_at_level(&self, level: u8) -> impl Iterator<Item = &TocEntry> {
        self.toc.iter().filter(move |e| e.level == level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_trims_title() {
        let e = TocEntry::new("  Chapter 1  ", 5, 1).unwrap();
        assert_eq!(e.title, "Chapter 1");
    }

    #[test]
    fn entry_rejects_empty_title() {
        assert!(TocEntry::new("   ", 5, 1).is_err());
        assert!(TocEntry::new("", 5, 1).is_err());
    }

    #[test]
    fn entry_rejects_bad_level() {
        assert!(TocEntry::new("Intro", 1, 0).is_err());
        assert!(TocEntry::new("Intro", 1, 6).is_err());
        assert!(TocEntry::new("Intro", 1, 5).is_ok());
    }

    #[test]
    fn apply_offset_maps_page_one_to_offset() {
        let e = TocEntry::new("Intro", 1, 1).unwrap();
        assert_eq!(e.apply_offset(15), 15);
        let e2 = TocEntry::new("Ch 2", 30, 1).unwrap();
        assert_eq!(e2.apply_offset(15), 44);
    }

    #[test]
    fn page_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_7.json");
        let page = TocPage::new(
            7,
            vec![
                TocEntry::new("Preface", 1, 1).unwrap(),
                TocEntry::new("Chapter 1", 3, 1).unwrap(),
            ],
        );
        page.save_json(&path).unwrap();

        // Artifact contract: bare array at the top level.
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_array());

        let loaded = TocPage::load_json(&path, 7).unwrap();
        assert_eq!(loaded.entries, page.entries);
    }

    #[test]
    fn merged_json_skips_absent_optionals() {
        let merged = MergedToc {
            metadata: TocMetadata::new("book.pdf", 15, 1),
            toc: vec![TocEntry::new("Intro", 1, 1).unwrap()],
        };
        let body = serde_json::to_string(&merged).unwrap();
        assert!(body.contains("\"metadata\""));
        assert!(body.contains("\"toc\""));
        assert!(!body.contains("toc_page_range"));
        assert!(!body.contains("model_name"));
    }

    #[test]
    fn merged_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toc_merged.json");
        let mut metadata = TocMetadata::new("book.pdf", 12, 2);
        metadata.toc_page_range = Some("7-10".into());
        let merged = MergedToc {
            metadata,
            toc: vec![
                TocEntry::new("Intro", 1, 1).unwrap(),
                TocEntry::new("Details", 9, 2).unwrap(),
            ],
        };
        merged.save_json(&path).unwrap();
        let loaded = MergedToc::load_json(&path).unwrap();
        assert_eq!(loaded.toc, merged.toc);
        assert_eq!(loaded.metadata.page_offset, 12);
        assert_eq!(loaded.metadata.toc_page_range.as_deref(), Some("7-10"));
    }

    #[test]
    fn entries_at_level_filters() {
        let merged = MergedToc {
            metadata: TocMetadata::new("b.pdf", 1, 3),
            toc: vec![
                TocEntry::new("A", 1, 1).unwrap(),
                TocEntry::new("A.1", 2, 2).unwrap(),
                TocEntry::new("B", 9, 1).unwrap(),
            ],
        };
        assert_eq!(merged.entries_at_level(1).count(), 2);
        assert_eq!(merged.entries_at_level(2).count(), 1);
        assert_eq!(merged.entries_at_level(3).count(), 0);
    }
}
