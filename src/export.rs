//! Plain-text export and re-import of a merged TOC.
//!
//! The text format exists for human proofreading: export, fix titles or
//! page numbers in any editor, re-import, write. Because the same file
//! comes back in, the format is a contract — indentation depth must
//! round-trip to the same level (`depth = indent/2 + 1`, two spaces per
//! level past the root, clamped to 1..=5) and every `(title, page, level)`
//! triple must survive an export → parse cycle unchanged.
//!
//! ```text
//! ============================================================
//! PDF table of contents
//! ============================================================
//!
//! File: book.pdf
//! Page offset: 15
//! Total entries: 42
//!
//! ------------------------------------------------------------
//!
//! Chapter 1  Introduction ... 1 (PDF: 15)
//!   1.1  Background ... 3 (PDF: 17)
//! ```

use crate::error::TocError;
use crate::model::{MergedToc, TocEntry, TocMetadata, MAX_LEVEL, MIN_LEVEL};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{info, warn};

const RULE_HEAVY: &str = "============================================================";
const RULE_LIGHT: &str = "------------------------------------------------------------";

/// Render a merged TOC in the editable text format.
pub fn export_toc_to_text(merged: &MergedToc) -> String {
    let mut out = String::new();
    out.push_str(RULE_HEAVY);
    out.push_str("\nPDF table of contents\n");
    out.push_str(RULE_HEAVY);
    out.push_str("\n\n");
    out.push_str(&format!("File: {}\n", merged.metadata.pdf_path));
    out.push_str(&format!("Page offset: {}\n", merged.metadata.page_offset));
    out.push_str(&format!("Total entries: {}\n\n", merged.metadata.total_entries));
    out.push_str(RULE_LIGHT);
    out.push_str("\n\n");

    for entry in &merged.toc {
        let indent = "  ".repeat((entry.level.saturating_sub(1)) as usize);
        let pdf_page = entry.apply_offset(merged.metadata.page_offset);
        out.push_str(&format!(
            "{indent}{} ... {} (PDF: {})\n",
            entry.title, entry.page, pdf_page
        ));
    }

    out
}

/// Write the text export next to the other artifacts.
pub fn export_toc_to_file(merged: &MergedToc, path: &Path) -> Result<(), TocError> {
    std::fs::write(path, export_toc_to_text(merged)).map_err(|e| TocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Metadata recovered from a text export's header block.
#[derive(Debug, Clone, Default)]
pub struct ImportedMetadata {
    pub pdf_path: Option<String>,
    pub page_offset: Option<i64>,
    pub total_entries: Option<usize>,
}

static RE_ENTRY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(.+?)\s+\.\.\.\s+(\d+)\s+\(PDF:\s*\d+\)").unwrap());

/// Parse the text format back into entries and header metadata.
///
/// Lines that do not match the entry pattern are skipped (with a warning
/// for lines inside the entry block that look torn), so hand-edited files
/// with stray notes still import.
///
/// # Errors
/// [`TocError::InvalidEntry`] via entry construction is downgraded to a
/// warning per line; the function fails only when *no* line parses —
/// reported by the caller as an empty import.
pub fn parse_toc_from_text(content: &str) -> (Vec<TocEntry>, ImportedMetadata) {
    let mut entries = Vec::new();
    let mut metadata = ImportedMetadata::default();
    let mut in_entries = false;

    for line in content.lines() {
        let line = line.trim_end();

        if line.starts_with("----------") {
            in_entries = true;
            continue;
        }
        if line.starts_with("==========") || line.trim() == "PDF table of contents" {
            continue;
        }

        if !in_entries {
            if let Some(rest) = line.strip_prefix("File:") {
                metadata.pdf_path = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("Page offset:") {
                metadata.page_offset = rest.trim().parse().ok();
            } else if let Some(rest) = line.strip_prefix("Total entries:") {
                metadata.total_entries = rest.trim().parse().ok();
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        let Some(caps) = RE_ENTRY_LINE.captures(line) else {
            warn!(line, "skipping unparseable TOC line");
            continue;
        };

        let indent = caps.get(1).map_or(0, |m| m.as_str().len());
        let title = caps[2].trim();
        let page: i64 = match caps[3].parse() {
            Ok(p) => p,
            Err(_) => continue,
        };

        // Two spaces per level past the root.
        let level = ((indent / 2) + 1).clamp(MIN_LEVEL as usize, MAX_LEVEL as usize) as u8;

        match TocEntry::new(title, page, level) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "skipping invalid TOC line"),
        }
    }

    (entries, metadata)
}

/// Import a merged TOC from a text file written by [`export_toc_to_file`]
/// (or hand-authored in the same format).
///
/// `pdf_path` and `page_offset` override whatever the file header carries;
/// each must be available from one of the two sources.
pub fn import_toc_from_text_file(
    text_path: &Path,
    pdf_path: Option<&str>,
    page_offset: Option<i64>,
) -> Result<MergedToc, TocError> {
    let content = std::fs::read_to_string(text_path).map_err(|_| TocError::FileNotFound {
        path: text_path.to_path_buf(),
    })?;

    let (entries, header) = parse_toc_from_text(&content);

    if entries.is_empty() {
        return Err(TocError::EmptyTextImport {
            path: text_path.to_path_buf(),
        });
    }

    let pdf_path = pdf_path
        .map(str::to_string)
        .or(header.pdf_path)
        .ok_or_else(|| {
            TocError::InvalidConfig(
                "no PDF path given and the text file header has no 'File:' line".into(),
            )
        })?;

    let page_offset = page_offset.or(header.page_offset).ok_or_else(|| {
        TocError::InvalidConfig(
            "no page offset given and the text file header has no 'Page offset:' line".into(),
        )
    })?;
    if page_offset < 1 {
        return Err(TocError::InvalidOffset { value: page_offset });
    }

    info!(entries = entries.len(), "imported TOC from text file");

    let mut metadata = TocMetadata::new(pdf_path, page_offset, entries.len());
    metadata.toc_page_range = Some("imported".into());
    metadata.model_name = Some("imported-from-text".into());

    Ok(MergedToc {
        metadata,
        toc: entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MergedToc {
        let mut metadata = TocMetadata::new("book.pdf", 15, 5);
        metadata.toc_page_range = Some("7-10".into());
        MergedToc {
            metadata,
            toc: vec![
                TocEntry::new("Chapter 1  Introduction", 1, 1).unwrap(),
                TocEntry::new("1.1  Background", 3, 2).unwrap(),
                TocEntry::new("1.1.1  History", 4, 3).unwrap(),
                TocEntry::new("Deepest", 5, 5).unwrap(),
                TocEntry::new("Chapter 2", 20, 1).unwrap(),
            ],
        }
    }

    #[test]
    fn export_applies_offset_in_pdf_column() {
        let text = export_toc_to_text(&sample());
        assert!(text.contains("Chapter 1  Introduction ... 1 (PDF: 15)"));
        assert!(text.contains("  1.1  Background ... 3 (PDF: 17)"));
    }

    #[test]
    fn round_trip_preserves_all_triples() {
        let merged = sample();
        let text = export_toc_to_text(&merged);
        let (entries, header) = parse_toc_from_text(&text);

        let originals: Vec<(&str, i64, u8)> = merged
            .toc
            .iter()
            .map(|e| (e.title.as_str(), e.page, e.level))
            .collect();
        let reparsed: Vec<(&str, i64, u8)> = entries
            .iter()
            .map(|e| (e.title.as_str(), e.page, e.level))
            .collect();
        assert_eq!(reparsed, originals);

        assert_eq!(header.pdf_path.as_deref(), Some("book.pdf"));
        assert_eq!(header.page_offset, Some(15));
        assert_eq!(header.total_entries, Some(5));
    }

    #[test]
    fn parse_skips_stray_lines() {
        let text = format!(
            "{RULE_LIGHT}\n\nIntro ... 1 (PDF: 1)\n(reviewed up to here)\nNext ... 2 (PDF: 2)\n"
        );
        let (entries, _) = parse_toc_from_text(&text);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn parse_clamps_over_deep_indentation() {
        let text = format!(
            "{RULE_LIGHT}\n\n{}Buried ... 9 (PDF: 9)\n",
            "  ".repeat(9)
        );
        let (entries, _) = parse_toc_from_text(&text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, 5);
    }

    #[test]
    fn import_round_trip_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toc.txt");
        let merged = sample();
        export_toc_to_file(&merged, &path).unwrap();

        let imported = import_toc_from_text_file(&path, None, None).unwrap();
        assert_eq!(imported.toc, merged.toc);
        assert_eq!(imported.metadata.pdf_path, "book.pdf");
        assert_eq!(imported.metadata.page_offset, 15);
        assert_eq!(imported.metadata.model_name.as_deref(), Some("imported-from-text"));
    }

    #[test]
    fn import_overrides_win_over_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toc.txt");
        export_toc_to_file(&sample(), &path).unwrap();

        let imported = import_toc_from_text_file(&path, Some("other.pdf"), Some(3)).unwrap();
        assert_eq!(imported.metadata.pdf_path, "other.pdf");
        assert_eq!(imported.metadata.page_offset, 3);
    }

    #[test]
    fn import_without_entries_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "nothing useful\n").unwrap();
        let err = import_toc_from_text_file(&path, Some("b.pdf"), Some(1)).unwrap_err();
        assert!(matches!(err, TocError::EmptyTextImport { .. }));
    }

    #[test]
    fn import_rejects_bad_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toc.txt");
        export_toc_to_file(&sample(), &path).unwrap();
        let err = import_toc_from_text_file(&path, None, Some(0)).unwrap_err();
        assert!(matches!(err, TocError::InvalidOffset { value: 0 }));
    }
}
