//! Top-level orchestration: PDF in, merged TOC (and artifacts) out.
//!
//! ```text
//! input ──▶ render ──▶ page pipelines ──▶ merge ──▶ artifacts
//! (path/URL) (pdfium)   (sequential or       (global    (page_N.json,
//!                        concurrent)          sort)      toc_merged.json, toc.txt)
//! ```
//!
//! Page pipelines are independent and the merge never starts until every
//! dispatched pipeline has settled — in concurrent mode they all run at
//! once, bounded by `config.concurrency`, sharing nothing but the
//! read-only model client.

use crate::client::{resolve_provider, ModelClient, VisionLlmClient};
use crate::config::{validate_offset, ExtractionConfig, PageRange};
use crate::error::TocError;
use crate::export;
use crate::merge;
use crate::model::{MergedToc, TocEntry, TocPage};
use crate::pdf;
use crate::pipeline::{run_page_with_retry, PipelineState};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the run's intermediate and final artifacts were written.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub work_dir: PathBuf,
    pub images_dir: PathBuf,
    pub json_dir: PathBuf,
    pub merged_json: PathBuf,
    pub text_export: PathBuf,
}

/// Aggregate counters for one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionStats {
    /// Pages in the requested TOC range.
    pub total_pages: usize,
    /// Pages whose pipeline settled without errors.
    pub clean_pages: usize,
    /// Pages that settled with errors (their partial entries still count).
    pub errored_pages: usize,
    pub total_entries: usize,
    pub render_duration_ms: u64,
    pub recognition_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything an extraction run produced.
pub struct ExtractionOutput {
    pub merged: MergedToc,
    pub pages: Vec<TocPage>,
    /// Per-page pipeline errors, for reporting; empty when all pages ran clean.
    pub page_errors: Vec<(u32, Vec<String>)>,
    pub stats: ExtractionStats,
    pub artifacts: ArtifactPaths,
    /// Keeps a temporary work dir alive until the caller drops the output.
    _work_dir_guard: Option<tempfile::TempDir>,
}

/// Extract the TOC of `input` (local path or URL) from the given page range.
///
/// Resolves a model provider from the configuration/environment, renders
/// the range, runs the per-page pipelines, merges, and writes all
/// artifacts. The outline is *not* written to the PDF here — that is a
/// separate, deliberately explicit step
/// ([`crate::pdf::write_outline_safely`]).
pub async fn extract_toc(
    input: &str,
    range: PageRange,
    page_offset: i64,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, TocError> {
    let provider = resolve_provider(config)?;
    let client: Arc<dyn ModelClient> = Arc::new(VisionLlmClient::new(provider, config));
    extract_toc_with_client(input, range, page_offset, config, client).await
}

/// [`extract_toc`] with a caller-supplied model client.
pub async fn extract_toc_with_client(
    input: &str,
    range: PageRange,
    page_offset: i64,
    config: &ExtractionConfig,
    client: Arc<dyn ModelClient>,
) -> Result<ExtractionOutput, TocError> {
    let total_start = Instant::now();
    let page_offset = validate_offset(page_offset)?;
    info!(input, %range, page_offset, "starting TOC extraction");

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = pdf::resolve_input(input, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // ── Step 2: Validate the range against the document ──────────────────
    let total_doc_pages = pdf::page_count(&pdf_path).await?;
    if range.end as usize > total_doc_pages {
        return Err(TocError::PageOutOfRange {
            page: range.end as usize,
            total: total_doc_pages,
        });
    }

    // ── Step 3: Work directory ───────────────────────────────────────────
    let (work_dir, guard) = match &config.work_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let tmp = tempfile::TempDir::new()
                .map_err(|e| TocError::Internal(format!("work dir: {e}")))?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };
    let images_dir = work_dir.join("toc_images");
    let json_dir = work_dir.join("toc_json");
    std::fs::create_dir_all(&json_dir).map_err(|e| TocError::OutputWriteFailed {
        path: json_dir.clone(),
        source: e,
    })?;

    // ── Step 4: Render the TOC pages ─────────────────────────────────────
    let render_start = Instant::now();
    let images = pdf::render_range(&pdf_path, range, config, &images_dir).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(pages = images.len(), ms = render_duration_ms, "rendered TOC pages");

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(images.len());
    }

    // ── Step 5: Recognise every page ─────────────────────────────────────
    let recog_start = Instant::now();
    let states = process_images(client.as_ref(), config, &images).await;
    let recognition_duration_ms = recog_start.elapsed().as_millis() as u64;

    // ── Step 6: Per-page artifacts + page assembly ───────────────────────
    let mut pages = Vec::with_capacity(states.len());
    let mut page_errors = Vec::new();
    let mut clean = 0usize;

    for (page_num, state) in &states {
        let page = toc_page_from_state(*page_num, state);
        page.save_json(&json_dir.join(format!("page_{page_num}.json")))?;

        if state.errors.is_empty() {
            clean += 1;
        } else {
            page_errors.push((*page_num, state.errors.clone()));
        }
        pages.push(page);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(states.len(), clean);
    }

    // ── Step 7: Merge ────────────────────────────────────────────────────
    let merged = merge::merge_pages(
        &pages,
        &pdf_path.to_string_lossy(),
        page_offset,
        Some(&range.to_string()),
        client.model_name().as_deref(),
    )?;

    // ── Step 8: Merged artifacts ─────────────────────────────────────────
    let merged_json = work_dir.join("toc_merged.json");
    merged.save_json(&merged_json)?;
    let text_export = work_dir.join("toc.txt");
    export::export_toc_to_file(&merged, &text_export)?;

    let stats = ExtractionStats {
        total_pages: states.len(),
        clean_pages: clean,
        errored_pages: states.len() - clean,
        total_entries: merged.toc.len(),
        render_duration_ms,
        recognition_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        entries = stats.total_entries,
        clean = stats.clean_pages,
        errored = stats.errored_pages,
        ms = stats.total_duration_ms,
        "extraction complete"
    );

    Ok(ExtractionOutput {
        merged,
        pages,
        page_errors,
        stats,
        artifacts: ArtifactPaths {
            work_dir,
            images_dir,
            json_dir,
            merged_json,
            text_export,
        },
        _work_dir_guard: guard,
    })
}

/// Run the page pipeline (with retries) over every rendered image.
///
/// Results come back in page order regardless of completion order. Every
/// pipeline settles before this returns — the merge must never see a
/// half-finished batch.
pub async fn process_images(
    client: &dyn ModelClient,
    config: &ExtractionConfig,
    images: &[(u32, PathBuf)],
) -> Vec<(u32, PipelineState)> {
    let total = images.len();

    let mut states: Vec<(u32, PipelineState)> = if config.sequential {
        let mut out = Vec::with_capacity(total);
        for (page_num, path) in images {
            out.push((*page_num, run_one(client, config, *page_num, path, total).await));
        }
        out
    } else {
        stream::iter(images.iter().map(|(page_num, path)| async move {
            (*page_num, run_one(client, config, *page_num, path, total).await)
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await
    };

    states.sort_by_key(|(page_num, _)| *page_num);
    states
}

async fn run_one(
    client: &dyn ModelClient,
    config: &ExtractionConfig,
    page_num: u32,
    path: &Path,
    total: usize,
) -> PipelineState {
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num as usize, total);
    }

    let state = run_page_with_retry(client, config, path).await;

    if let Some(ref cb) = config.progress_callback {
        if state.errors.is_empty() {
            cb.on_page_complete(page_num as usize, total, state.entry_count());
        } else {
            cb.on_page_error(
                page_num as usize,
                total,
                &state.errors.join("; "),
            );
        }
    }
    state
}

/// Convert a settled pipeline state into a [`TocPage`].
///
/// Entries that cannot satisfy [`TocEntry::new`]'s invariants (possible
/// when validation classified the page invalid and the raw values were
/// kept) are skipped with a warning, mirroring the per-entry tolerance of
/// the rest of the pipeline.
pub fn toc_page_from_state(page_num: u32, state: &PipelineState) -> TocPage {
    let mut entries = Vec::new();

    if let Some(values) = &state.structured_data {
        for value in values {
            match entry_from_value(value) {
                Some(entry) => entries.push(entry),
                None => warn!(page = page_num, ?value, "skipping unusable entry"),
            }
        }
    } else {
        debug!(page = page_num, "page produced no structured data");
    }

    let mut page = TocPage::new(page_num, entries);
    page.source_image = Some(state.image_path.clone());
    page
}

fn entry_from_value(value: &Value) -> Option<TocEntry> {
    let obj = value.as_object()?;
    let title = obj.get("title")?.as_str()?;
    let page = obj.get("page")?.as_i64()?;
    let level = u8::try_from(obj.get("level")?.as_i64()?).ok()?;
    TocEntry::new(title, page, level).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_from_value_respects_invariants() {
        assert!(entry_from_value(&json!({"title": "Ok", "page": 3, "level": 2})).is_some());
        assert!(entry_from_value(&json!({"title": "", "page": 3, "level": 2})).is_none());
        assert!(entry_from_value(&json!({"title": "Deep", "page": 3, "level": 9})).is_none());
        assert!(entry_from_value(&json!({"page": 3, "level": 1})).is_none());
    }

    #[test]
    fn toc_page_from_state_collects_valid_entries() {
        let mut state = PipelineState::new("page_7.png");
        state.structured_data = Some(vec![
            json!({"title": "A", "page": 1, "level": 1}),
            json!({"title": "", "page": 2, "level": 1}),
            json!({"title": "B", "page": 3, "level": 2}),
        ]);
        let page = toc_page_from_state(7, &state);
        assert_eq!(page.page_number, 7);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.source_image.as_deref(), Some(Path::new("page_7.png")));
    }

    #[test]
    fn toc_page_from_empty_state_is_empty() {
        let state = PipelineState::new("page_7.png");
        let page = toc_page_from_state(7, &state);
        assert!(page.entries.is_empty());
    }
}
