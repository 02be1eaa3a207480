//! Map a merged TOC onto the flat PDF outline format.
//!
//! PDF viewers reconstruct the bookmark tree from a linear list of
//! `(level, title, page)` rows, and the format is unforgiving: the first
//! row must sit at level 1, and no row may be more than one level deeper
//! than its predecessor — a child cannot appear without a parent. Rather
//! than reject a TOC the model got slightly wrong, the builder repairs
//! levels in a single left-to-right pass.

use crate::error::TocError;
use crate::model::MergedToc;
use tracing::{debug, info};

/// One writable outline row: `(level, title, page-in-output-document)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineRow {
    pub level: u8,
    pub title: String,
    /// 1-based page number in the *output* document, offset already applied.
    pub page: i64,
}

/// Build the linear outline list from a merged TOC.
///
/// In document order, each entry is:
/// 1. skipped if its printed page is negative,
/// 2. offset-mapped (`page + offset - 1` when `apply_offset`) and skipped
///    if the result is below 1,
/// 3. skipped if `max_page` is given and the result exceeds it,
/// 4. level-repaired: the first retained row is forced to level 1, later
///    rows are clamped to `previous + 1` when they jump too deep, and
///    floored at 1.
///
/// # Errors
/// [`TocError::NoWritableEntries`] when every entry was filtered out —
/// callers must treat that as a hard stop before touching the target
/// document.
pub fn build_outline(
    merged: &MergedToc,
    apply_offset: bool,
    max_page: Option<i64>,
) -> Result<Vec<OutlineRow>, TocError> {
    let offset = if apply_offset {
        merged.metadata.page_offset
    } else {
        1
    };

    let mut rows: Vec<OutlineRow> = Vec::with_capacity(merged.toc.len());
    let mut filtered = 0usize;
    let mut fixed = 0usize;

    for entry in &merged.toc {
        if entry.page < 0 {
            filtered += 1;
            debug!(title = %entry.title, page = entry.page, "skipping negative page");
            continue;
        }

        let page = entry.apply_offset(offset);
        if page < 1 {
            filtered += 1;
            debug!(
                title = %entry.title,
                printed = entry.page,
                mapped = page,
                "skipping entry that maps before page 1"
            );
            continue;
        }

        if let Some(max) = max_page {
            if page > max {
                filtered += 1;
                debug!(
                    title = %entry.title,
                    mapped = page,
                    max,
                    "skipping entry beyond the document"
                );
                continue;
            }
        }

        let level = match rows.last() {
            // An outline must start at the root.
            None => {
                if entry.level != 1 {
                    fixed += 1;
                }
                1
            }
            Some(prev) => {
                if entry.level > prev.level + 1 {
                    // No level may appear without an intervening parent.
                    fixed += 1;
                    prev.level + 1
                } else if entry.level < 1 {
                    fixed += 1;
                    1
                } else {
                    entry.level
                }
            }
        };

        rows.push(OutlineRow {
            level,
            title: entry.title.clone(),
            page,
        });
    }

    if filtered > 0 {
        info!(filtered, "filtered entries while building outline");
    }
    if fixed > 0 {
        info!(fixed, "repaired level discontinuities");
    }

    if rows.is_empty() {
        return Err(TocError::NoWritableEntries);
    }

    Ok(rows)
}
