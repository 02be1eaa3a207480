//! Rasterise the TOC page range to PNG files via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium wraps a C++ library with thread-local state; it must not run on
//! Tokio worker threads. `spawn_blocking` moves the whole render batch to
//! the blocking pool.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, which both bounds memory and matches the
//! image-size sweet spot of current vision models.

use crate::config::{ExtractionConfig, PageRange};
use crate::error::TocError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info};

/// Total number of pages in the document.
pub async fn page_count(pdf_path: &Path) -> Result<usize, TocError> {
    let path = pdf_path.to_path_buf();
    task::spawn_blocking(move || {
        let pdfium = Pdfium::default();
        let document = load_document(&pdfium, &path)?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| TocError::Internal(format!("page-count task panicked: {e}")))?
}

/// Render every page of `range` to `<out_dir>/page_N.png`.
///
/// Returns `(page_number, image_path)` pairs in page order. The range is
/// validated against the real page count first; an out-of-range request is
/// fatal rather than silently clipped.
pub async fn render_range(
    pdf_path: &Path,
    range: PageRange,
    config: &ExtractionConfig,
    out_dir: &Path,
) -> Result<Vec<(u32, PathBuf)>, TocError> {
    let path = pdf_path.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;

    task::spawn_blocking(move || render_range_blocking(&path, range, dpi, max_pixels, &out_dir))
        .await
        .map_err(|e| TocError::Internal(format!("render task panicked: {e}")))?
}

fn load_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, TocError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| TocError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn render_range_blocking(
    pdf_path: &Path,
    range: PageRange,
    dpi: u32,
    max_pixels: u32,
    out_dir: &Path,
) -> Result<Vec<(u32, PathBuf)>, TocError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, pdf_path)?;
    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {total} pages");

    if range.end as usize > total {
        return Err(TocError::PageOutOfRange {
            page: range.end as usize,
            total,
        });
    }

    std::fs::create_dir_all(out_dir).map_err(|e| TocError::OutputWriteFailed {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    // DPI sets the nominal scale (a US-letter page is 8.5 in wide); the
    // pixel cap wins when they disagree.
    let target = (dpi as f32 * 8.5).min(max_pixels as f32) as i32;
    let render_config = PdfRenderConfig::new()
        .set_target_width(target)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(range.len());

    for page_num in range.pages() {
        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| TocError::RenderFailed {
                page: page_num as usize,
                detail: format!("{e:?}"),
            })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| TocError::RenderFailed {
                page: page_num as usize,
                detail: format!("{e:?}"),
            })?;

        let image: DynamicImage = bitmap.as_image();
        let out_path = out_dir.join(format!("page_{page_num}.png"));
        image
            .save_with_format(&out_path, image::ImageFormat::Png)
            .map_err(|e| TocError::RenderFailed {
                page: page_num as usize,
                detail: format!("PNG encoding failed: {e}"),
            })?;

        debug!(
            page = page_num,
            width = image.width(),
            height = image.height(),
            out = %out_path.display(),
            "rendered TOC page"
        );
        results.push((page_num, out_path));
    }

    Ok(results)
}
