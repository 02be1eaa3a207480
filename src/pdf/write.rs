//! Outline read/write on the PDF object graph, via lopdf.
//!
//! Reading walks the `/Outlines` tree through `/First`/`/Next` links with
//! cycle protection, resolving each node's destination to a 1-based page
//! number. Writing goes the other way: repaired [`OutlineRow`]s become a
//! bookmark tree (parentage derived from the level sequence), lopdf builds
//! the `/Outlines` objects, and the catalog is pointed at the new root.
//!
//! [`write_outline_safely`] is the policy gate: pre-write validation
//! errors always block, warnings block unless forced, and in-place writes
//! copy the original to a `.pdf.bak` sibling first.

use crate::error::TocError;
use crate::merge;
use crate::model::MergedToc;
use crate::outline::{build_outline, OutlineRow};
use lopdf::{Bookmark, Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Nesting deeper than this in `/Outlines` is treated as a broken file.
const MAX_OUTLINE_DEPTH: u8 = 32;

fn load_document(path: &Path) -> Result<Document, TocError> {
    if !path.exists() {
        return Err(TocError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Document::load(path).map_err(|e| TocError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Follow a reference one hop; non-references come back unchanged.
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj.as_reference() {
        Ok(id) => doc.get_object(id).unwrap_or(obj),
        Err(_) => obj,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1.
fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&utf16)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Read the document's existing outline as flat `(level, title, page)` rows.
///
/// Unresolvable destinations yield `page = 0` rather than dropping the row,
/// so callers can still show the bookmark titles.
pub fn existing_outline(pdf_path: &Path) -> Result<Vec<OutlineRow>, TocError> {
    let doc = load_document(pdf_path)?;

    let page_numbers: HashMap<ObjectId, u32> =
        doc.get_pages().into_iter().map(|(num, id)| (id, num)).collect();

    let mut rows = Vec::new();

    let Some(first) = outline_first_child(&doc) else {
        return Ok(rows);
    };

    let mut visited = HashSet::new();
    walk_outline(&doc, first, 1, &page_numbers, &mut visited, &mut rows);
    Ok(rows)
}

/// `/Root` → `/Outlines` → `/First`, tolerating absent pieces.
fn outline_first_child(doc: &Document) -> Option<ObjectId> {
    let root = doc.trailer.get(b"Root").ok()?;
    let catalog = resolve(doc, root).as_dict().ok()?;
    let outlines = resolve(doc, catalog.get(b"Outlines").ok()?).as_dict().ok()?;
    outlines.get(b"First").ok()?.as_reference().ok()
}

fn walk_outline(
    doc: &Document,
    start: ObjectId,
    level: u8,
    page_numbers: &HashMap<ObjectId, u32>,
    visited: &mut HashSet<ObjectId>,
    rows: &mut Vec<OutlineRow>,
) {
    if level > MAX_OUTLINE_DEPTH {
        return;
    }

    let mut current = Some(start);
    while let Some(id) = current {
        if !visited.insert(id) {
            warn!(?id, "outline contains a cycle, stopping walk");
            break;
        }

        let Ok(node) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };

        let title = node
            .get(b"Title")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| match o {
                Object::String(bytes, _) => Some(decode_text(bytes)),
                _ => None,
            })
            .unwrap_or_default();

        let page = dest_page(doc, node, page_numbers).unwrap_or(0);
        rows.push(OutlineRow {
            level,
            title,
            page: i64::from(page),
        });

        if let Ok(child) = node.get(b"First").and_then(Object::as_reference) {
            walk_outline(doc, child, level + 1, page_numbers, visited, rows);
        }

        current = node.get(b"Next").and_then(Object::as_reference).ok();
    }
}

/// Resolve a node's `/Dest` (or `/A` GoTo action) to a 1-based page number.
fn dest_page(
    doc: &Document,
    node: &Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    let dest = if let Ok(d) = node.get(b"Dest") {
        resolve(doc, d)
    } else {
        let action = resolve(doc, node.get(b"A").ok()?).as_dict().ok()?;
        resolve(doc, action.get(b"D").ok()?)
    };

    let array = dest.as_array().ok()?;
    let page_id = array.first()?.as_reference().ok()?;
    page_numbers.get(&page_id).copied()
}

/// True when the document already carries at least one bookmark.
pub fn has_outline(pdf_path: &Path) -> bool {
    existing_outline(pdf_path).map_or(false, |rows| !rows.is_empty())
}

/// Write `rows` as the document's outline, replacing any existing one.
///
/// Writes to `output_path` when given, otherwise in place (with a
/// `.pdf.bak` backup copy first). Rows pointing at pages the document does
/// not have are skipped with a warning.
pub fn write_outline(
    pdf_path: &Path,
    rows: &[OutlineRow],
    output_path: Option<&Path>,
) -> Result<PathBuf, TocError> {
    if rows.is_empty() {
        return Err(TocError::NoWritableEntries);
    }

    let output: PathBuf = output_path.unwrap_or(pdf_path).to_path_buf();
    let in_place = output == pdf_path;

    if in_place {
        let backup = pdf_path.with_extension("pdf.bak");
        std::fs::copy(pdf_path, &backup).map_err(|e| TocError::OutputWriteFailed {
            path: backup.clone(),
            source: e,
        })?;
        info!("backed up original to {}", backup.display());
    }

    let mut doc = load_document(pdf_path)?;
    let pages = doc.get_pages();

    // Parentage from the level sequence: each row becomes a child of the
    // nearest earlier row with a smaller level.
    let mut stack: Vec<(u8, u32)> = Vec::new();
    let mut added = 0usize;

    for row in rows {
        let Ok(page_num) = u32::try_from(row.page) else {
            warn!(title = %row.title, page = row.page, "skipping row with unusable page");
            continue;
        };
        let Some(&page_id) = pages.get(&page_num) else {
            warn!(
                title = %row.title,
                page = page_num,
                "skipping row pointing beyond the document"
            );
            continue;
        };

        while stack.last().is_some_and(|&(level, _)| level >= row.level) {
            stack.pop();
        }
        let parent = stack.last().map(|&(_, idx)| idx);

        let idx = doc.add_bookmark(
            Bookmark::new(row.title.clone(), [0.0, 0.0, 0.0], 0, page_id),
            parent,
        );
        stack.push((row.level, idx));
        added += 1;
        debug!(title = %row.title, level = row.level, page = page_num, "bookmark added");
    }

    if added == 0 {
        return Err(TocError::NoWritableEntries);
    }

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| TocError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("no document catalog: {e}"),
        })?;

    let outline_id = doc.build_outline().ok_or(TocError::NoWritableEntries)?;

    match doc.get_object_mut(catalog_id) {
        Ok(Object::Dictionary(catalog)) => {
            catalog.set("Outlines", Object::Reference(outline_id));
        }
        _ => {
            return Err(TocError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: "document catalog is not a dictionary".into(),
            })
        }
    }

    doc.save(&output).map_err(|e| TocError::OutputWriteFailed {
        path: output.clone(),
        source: std::io::Error::other(e.to_string()),
    })?;

    info!(entries = added, "outline written to {}", output.display());
    Ok(output)
}

/// Outcome of pre-write validation.
#[derive(Debug, Clone)]
pub struct WriteCheck {
    /// True iff `errors` is empty.
    pub can_write: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub total_pages: usize,
    /// Rows that would actually be written after filtering.
    pub writable_entries: usize,
}

/// Check whether `merged` can be written into `pdf_path`.
///
/// Errors: missing/corrupt PDF, empty TOC, nothing writable after
/// filtering against the real page count. Warnings: merged-TOC data-quality
/// findings and an existing outline that would be replaced.
pub fn validate_before_write(pdf_path: &Path, merged: &MergedToc) -> WriteCheck {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let total_pages = match load_document(pdf_path) {
        Ok(doc) => doc.get_pages().len(),
        Err(e) => {
            return WriteCheck {
                can_write: false,
                errors: vec![e.to_string()],
                warnings,
                total_pages: 0,
                writable_entries: 0,
            }
        }
    };

    let report = merge::validate_merged(merged);
    errors.extend(report.errors);
    warnings.extend(report.warnings);

    let writable_entries = match build_outline(merged, true, Some(total_pages as i64)) {
        Ok(rows) => rows.len(),
        Err(_) if merged.toc.is_empty() => 0,
        Err(_) => {
            errors.push("no writable entries after filtering against the page count".to_string());
            0
        }
    };

    if has_outline(pdf_path) {
        warnings.push("PDF already has an outline; writing will replace it".to_string());
    }

    WriteCheck {
        can_write: errors.is_empty(),
        errors,
        warnings,
        total_pages,
        writable_entries,
    }
}

/// Validate, then write — the policy gate in front of [`write_outline`].
///
/// # Errors
/// - [`TocError::WriteRefused`] when validation found errors (never
///   overridable),
/// - [`TocError::WriteBlocked`] when it found warnings and `force` is
///   false,
/// - whatever [`write_outline`] raises.
pub fn write_outline_safely(
    pdf_path: &Path,
    merged: &MergedToc,
    output_path: Option<&Path>,
    force: bool,
) -> Result<PathBuf, TocError> {
    let check = validate_before_write(pdf_path, merged);

    if !check.can_write {
        return Err(TocError::WriteRefused {
            errors: check.errors,
        });
    }

    if !check.warnings.is_empty() && !force {
        return Err(TocError::WriteBlocked {
            warnings: check.warnings,
        });
    }

    let rows = build_outline(merged, true, Some(check.total_pages as i64))?;
    write_outline(pdf_path, &rows, output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TocEntry, TocMetadata};
    use lopdf::{dictionary, Stream};

    /// Build a minimal n-page PDF on disk.
    fn minimal_pdf(n_pages: u32, path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = (0..n_pages)
            .map(|_| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                });
                Object::Reference(page_id)
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => n_pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn merged(offset: i64, entries: Vec<(&str, i64, u8)>) -> MergedToc {
        MergedToc {
            metadata: TocMetadata::new("book.pdf", offset, entries.len()),
            toc: entries
                .into_iter()
                .map(|(t, p, l)| TocEntry::new(t, p, l).unwrap())
                .collect(),
        }
    }

    fn rows(data: &[(u8, &str, i64)]) -> Vec<OutlineRow> {
        data.iter()
            .map(|&(level, title, page)| OutlineRow {
                level,
                title: title.into(),
                page,
            })
            .collect()
    }

    #[test]
    fn fresh_pdf_has_no_outline() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        minimal_pdf(5, &pdf);

        assert!(existing_outline(&pdf).unwrap().is_empty());
        assert!(!has_outline(&pdf));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        let out = dir.path().join("book_toc.pdf");
        minimal_pdf(10, &pdf);

        let written = write_outline(
            &pdf,
            &rows(&[(1, "Chapter 1", 1), (2, "Section 1.1", 2), (1, "Chapter 2", 5)]),
            Some(&out),
        )
        .unwrap();
        assert_eq!(written, out);

        let read_back = existing_outline(&out).unwrap();
        assert_eq!(read_back.len(), 3);
        assert_eq!(read_back[0].title, "Chapter 1");
        assert_eq!(read_back[0].level, 1);
        assert_eq!(read_back[0].page, 1);
        assert_eq!(read_back[1].title, "Section 1.1");
        assert_eq!(read_back[1].level, 2);
        assert_eq!(read_back[2].title, "Chapter 2");
        assert_eq!(read_back[2].page, 5);
        assert!(has_outline(&out));
    }

    #[test]
    fn write_skips_rows_beyond_document() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        let out = dir.path().join("out.pdf");
        minimal_pdf(3, &pdf);

        write_outline(
            &pdf,
            &rows(&[(1, "In", 2), (1, "Beyond", 99)]),
            Some(&out),
        )
        .unwrap();

        let read_back = existing_outline(&out).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].title, "In");
    }

    #[test]
    fn write_with_no_usable_rows_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        minimal_pdf(3, &pdf);

        let err = write_outline(&pdf, &rows(&[(1, "Beyond", 99)]), None).unwrap_err();
        assert!(matches!(err, TocError::NoWritableEntries));
    }

    #[test]
    fn in_place_write_creates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        minimal_pdf(4, &pdf);

        write_outline(&pdf, &rows(&[(1, "Only", 1)]), None).unwrap();

        assert!(dir.path().join("book.pdf.bak").exists());
        assert!(has_outline(&pdf));
    }

    #[test]
    fn safe_write_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        let out = dir.path().join("out.pdf");
        minimal_pdf(20, &pdf);

        let m = merged(3, vec![("Intro", 1, 1), ("Body", 5, 1)]);
        let written = write_outline_safely(&pdf, &m, Some(&out), false).unwrap();

        let read_back = existing_outline(&written).unwrap();
        // Offset 3: printed page 1 -> PDF page 3, printed 5 -> 7.
        assert_eq!(read_back[0].page, 3);
        assert_eq!(read_back[1].page, 7);
    }

    #[test]
    fn safe_write_refuses_empty_toc() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        minimal_pdf(4, &pdf);

        let err = write_outline_safely(&pdf, &merged(1, vec![]), None, true).unwrap_err();
        assert!(matches!(err, TocError::WriteRefused { .. }));
    }

    #[test]
    fn safe_write_blocks_on_warning_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        let out = dir.path().join("out.pdf");
        minimal_pdf(20, &pdf);

        // Duplicate titles produce a warning.
        let m = merged(1, vec![("Same", 1, 1), ("Same", 2, 1)]);
        let err = write_outline_safely(&pdf, &m, Some(&out), false).unwrap_err();
        assert!(matches!(err, TocError::WriteBlocked { .. }));

        // Forced, the same write goes through.
        write_outline_safely(&pdf, &m, Some(&out), true).unwrap();
        assert!(has_outline(&out));
    }

    #[test]
    fn safe_write_warns_about_existing_outline() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        minimal_pdf(6, &pdf);

        let m = merged(1, vec![("First", 1, 1)]);
        write_outline_safely(&pdf, &m, None, true).unwrap();

        let check = validate_before_write(&pdf, &m);
        assert!(check.can_write);
        assert!(check
            .warnings
            .iter()
            .any(|w| w.contains("already has an outline")));
    }
}
