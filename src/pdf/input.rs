//! Input resolution: normalise a user-supplied path or URL to a local PDF.
//!
//! URLs are downloaded into a `TempDir` that lives inside the returned
//! [`ResolvedInput`], so cleanup happens automatically when processing
//! finishes — even on panic. The `%PDF` magic is checked up front so the
//! caller gets a meaningful error instead of a pdfium crash later.

use crate::error::TocError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the PDF lives in a temp directory kept alive by
    /// this variant.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve an input string to a validated local PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, TocError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, TocError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(TocError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(TocError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TocError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(TocError::FileNotFound { path });
        }
    }

    debug!("resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TocError> {
    info!("downloading PDF from {url}");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TocError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TocError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TocError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| TocError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let temp_dir = TempDir::new().map_err(|e| TocError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(TocError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| TocError::Internal(format!("failed to write temp file: {e}")))?;

    info!("downloaded to {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/book.pdf"));
        assert!(is_url("http://example.com/book.pdf"));
        assert!(!is_url("/tmp/book.pdf"));
        assert!(!is_url("book.pdf"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_local("/no/such/book.pdf").unwrap_err();
        assert!(matches!(err, TocError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04 zip actually").unwrap();
        let err = resolve_local(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TocError::NotAPdf { .. }));
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7\n...").unwrap();
        let resolved = resolve_local(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved.path(), path);
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(
            filename_from_url("https://example.com/papers/book.pdf"),
            "book.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }
}
