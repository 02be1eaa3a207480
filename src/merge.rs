//! Combine per-page recognition results into one document-level TOC.
//!
//! ## Why a global re-sort?
//!
//! OCR page boundaries give no ordering guarantee: a two-column TOC page
//! can yield entries whose printed page numbers interleave with the next
//! image's, and a model occasionally emits a stray front-matter entry late.
//! Concatenating per-page lists in page order is therefore not enough — the
//! merged list is stable-sorted by printed page number across *all* pages.
//! The stable sort preserves pipeline order among entries that share a
//! page, which is why [`page_order_warnings`] is kept as a consistency
//! check rather than dead code.

use crate::error::TocError;
use crate::model::{MergedToc, TocEntry, TocMetadata, TocPage, MAX_LEVEL, MIN_LEVEL};
use tracing::{info, warn};

/// Merge per-page results into a single, globally sorted [`MergedToc`].
///
/// Entries with a negative printed page are dropped (logged, not fatal);
/// `total_entries` in the metadata reflects the post-filter count.
///
/// # Errors
/// [`TocError::EmptyMerge`] when `pages` is empty.
pub fn merge_pages(
    pages: &[TocPage],
    pdf_path: &str,
    page_offset: i64,
    toc_page_range: Option<&str>,
    model_name: Option<&str>,
) -> Result<MergedToc, TocError> {
    if pages.is_empty() {
        return Err(TocError::EmptyMerge);
    }

    let mut entries: Vec<TocEntry> = Vec::new();
    let mut filtered = 0usize;

    for page in pages {
        for entry in &page.entries {
            if entry.page >= 0 {
                entries.push(entry.clone());
            } else {
                filtered += 1;
                warn!(
                    title = %entry.title,
                    page = entry.page,
                    "dropping entry with negative page number"
                );
            }
        }
    }

    if filtered > 0 {
        info!(filtered, "filtered negative-page entries during merge");
    }

    // Global order by printed page; stable, so same-page entries keep
    // their pipeline order.
    entries.sort_by_key(|e| e.page);

    info!(
        pages = pages.len(),
        entries = entries.len(),
        "merged TOC pages"
    );

    let mut metadata = TocMetadata::new(pdf_path, page_offset, entries.len());
    metadata.toc_page_range = toc_page_range.map(str::to_string);
    metadata.model_name = model_name.map(str::to_string);

    let merged = MergedToc {
        metadata,
        toc: entries,
    };

    for w in page_order_warnings(&merged) {
        warn!("{w}");
    }

    Ok(merged)
}

/// Adjacent pairs whose page numbers run backwards.
///
/// After the merge sort this can only arise from ties and upstream
/// anomalies, but it stays in as a cheap consistency check on anything
/// claiming to be a finished TOC (including imported ones).
pub fn page_order_warnings(merged: &MergedToc) -> Vec<String> {
    merged
        .toc
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[1].page < w[0].page)
        .map(|(i, w)| {
            format!(
                "entry {} ('{}') has page {} below the previous entry's {}",
                i + 2,
                w[1].title,
                w[1].page,
                w[0].page
            )
        })
        .collect()
}

/// Aggregate health report for a merged TOC.
#[derive(Debug, Clone)]
pub struct MergedReport {
    /// True iff `errors` is empty; warnings never block.
    pub is_valid: bool,
    pub total_entries: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Count of entries per level, index 0 = level 1.
    pub level_counts: [usize; MAX_LEVEL as usize],
}

/// Validate a merged TOC for structural and plausibility problems.
///
/// Errors (blocking): empty TOC, any page below 1. Warnings (advisory):
/// non-monotonic adjacent pages, level jumps greater than one, a maximum
/// page beyond 9999, duplicate titles (each distinct title reported once).
pub fn validate_merged(merged: &MergedToc) -> MergedReport {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    if merged.toc.is_empty() {
        errors.push("TOC is empty".to_string());
    }

    warnings.extend(page_order_warnings(merged));

    for (i, w) in merged.toc.windows(2).enumerate() {
        if w[1].level > w[0].level + 1 {
            warnings.push(format!(
                "entry {} ('{}') jumps from level {} to {}",
                i + 2,
                w[1].title,
                w[0].level,
                w[1].level
            ));
        }
    }

    if let (Some(min), Some(max)) = (
        merged.toc.iter().map(|e| e.page).min(),
        merged.toc.iter().map(|e| e.page).max(),
    ) {
        if min < 1 {
            errors.push(format!("invalid page number present: {min}"));
        }
        if max > 9999 {
            warnings.push(format!("implausibly large page number: {max}"));
        }
    }

    // Duplicate titles, reported once per distinct duplicated title.
    let mut seen = std::collections::HashSet::new();
    let mut reported = std::collections::HashSet::new();
    for entry in &merged.toc {
        if !seen.insert(entry.title.as_str()) && reported.insert(entry.title.as_str()) {
            warnings.push(format!("duplicate title: '{}'", entry.title));
        }
    }

    let mut level_counts = [0usize; MAX_LEVEL as usize];
    for entry in &merged.toc {
        if (MIN_LEVEL..=MAX_LEVEL).contains(&entry.level) {
            level_counts[(entry.level - 1) as usize] += 1;
        }
    }

    MergedReport {
        is_valid: errors.is_empty(),
        total_entries: merged.toc.len(),
        warnings,
        errors,
        level_counts,
    }
}
