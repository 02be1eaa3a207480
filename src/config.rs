//! Configuration for a TOC extraction run.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`] and then passed *by reference* into the
//! components that need it. There is deliberately no ambient/global
//! configuration: one struct, constructed once at process start, makes runs
//! reproducible and lets tests assemble exactly the knobs they exercise.
//!
//! # Design choice: builder over constructor
//! A constructor with this many fields is unreadable and breaks on every
//! new knob. The builder lets callers set only what they care about and
//! rely on documented defaults for the rest.

use crate::error::TocError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for extracting and writing a PDF table of contents.
///
/// # Example
/// ```rust
/// use pdftoc::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for TOC page images. Range: 72–400. Default: 150.
    ///
    /// 150 DPI keeps text sharp enough for a VLM while staying well under
    /// API upload limits. Raise to 200–300 for small-font TOC pages.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Default: 2048. A safety cap independent of DPI so an oversized page
    /// cannot exhaust memory or the API's image limits.
    pub max_rendered_pixels: u32,

    /// Number of page pipelines running at once. Default: 4.
    ///
    /// Each pipeline issues up to three model calls; TOC ranges are short
    /// (a handful of pages), so a small factor already saturates the win.
    pub concurrency: usize,

    /// Process pages strictly in order instead of concurrently. Default: false.
    pub sequential: bool,

    /// LLM model identifier. If None, the provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Near-zero keeps the model faithful to what is printed on the page —
    /// exactly what transcription wants.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 8192.
    ///
    /// Dense TOC pages produce long entry arrays; a low cap is the main
    /// cause of the mid-array truncation the recovery layer exists for.
    pub max_tokens: usize,

    /// Maximum pipeline re-runs per page after an unusable result. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt. Default: 2000.
    pub retry_backoff_ms: u64,

    /// Override for the structure-parsing prompt template. Must contain the
    /// `{raw_text}` placeholder. If None, the built-in prompt is used.
    pub parse_prompt: Option<String>,

    /// Directory for intermediate artifacts (page images, per-page JSON,
    /// merged JSON, text export). If None, a temporary directory is used
    /// and cleaned up when the run's output is dropped.
    pub work_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Progress callback for per-page events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2048,
            concurrency: 4,
            sequential: false,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 2000,
            parse_prompt: None,
            work_dir: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("sequential", &self.sequential)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(256);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn sequential(mut self, v: bool) -> Self {
        self.config.sequential = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn parse_prompt(mut self, template: impl Into<String>) -> Self {
        self.config.parse_prompt = Some(template.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, TocError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(TocError::InvalidConfig(format!(
                "DPI must be 72-400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(TocError::InvalidConfig("concurrency must be >= 1".into()));
        }
        if let Some(ref template) = c.parse_prompt {
            if !template.contains("{raw_text}") {
                return Err(TocError::InvalidConfig(
                    "parse prompt override must contain the {raw_text} placeholder".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

/// An inclusive, 1-based page range such as "7-10".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Parse `"START-END"`. A single number is the one-page range.
    ///
    /// # Errors
    /// [`TocError::InvalidPageRange`] on anything malformed or inverted;
    /// range input is never coerced.
    pub fn parse(input: &str) -> Result<Self, TocError> {
        let bad = |reason: &str| TocError::InvalidPageRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let s = input.trim();
        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (
                a.trim().parse::<u32>().map_err(|_| bad("start is not a number"))?,
                b.trim().parse::<u32>().map_err(|_| bad("end is not a number"))?,
            ),
            None => {
                let p = s.parse::<u32>().map_err(|_| bad("not a number or START-END"))?;
                (p, p)
            }
        };

        if start < 1 {
            return Err(bad("pages are 1-based"));
        }
        if end < start {
            return Err(bad("start must be <= end"));
        }

        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate the 1-based page numbers in order.
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Validate a page offset (the PDF page carrying the book's page 1).
pub fn validate_offset(offset: i64) -> Result<i64, TocError> {
    if offset < 1 {
        return Err(TocError::InvalidOffset { value: offset });
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_build() {
        let config = ExtractionConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.concurrency, 4);
        assert!(!config.sequential);
    }

    #[test]
    fn builder_clamps_dpi() {
        let config = ExtractionConfig::builder().dpi(10_000).build().unwrap();
        assert_eq!(config.dpi, 400);
    }

    #[test]
    fn builder_rejects_bad_parse_prompt() {
        let err = ExtractionConfig::builder()
            .parse_prompt("no placeholder here")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("{raw_text}"));
    }

    #[test]
    fn range_parses_pair_and_single() {
        assert_eq!(PageRange::parse("5-12").unwrap(), PageRange { start: 5, end: 12 });
        assert_eq!(PageRange::parse(" 7 - 10 ").unwrap(), PageRange { start: 7, end: 10 });
        assert_eq!(PageRange::parse("9").unwrap(), PageRange { start: 9, end: 9 });
    }

    #[test]
    fn range_rejects_garbage() {
        for bad in ["", "abc", "5-", "-7", "10-7", "0-3", "5--9"] {
            assert!(PageRange::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn range_len_and_iteration() {
        let r = PageRange::parse("7-10").unwrap();
        assert_eq!(r.len(), 4);
        assert_eq!(r.pages().collect::<Vec<_>>(), vec![7, 8, 9, 10]);
        assert_eq!(r.to_string(), "7-10");
    }

    #[test]
    fn offset_must_be_positive() {
        assert!(validate_offset(1).is_ok());
        assert!(validate_offset(15).is_ok());
        assert!(matches!(
            validate_offset(0),
            Err(TocError::InvalidOffset { value: 0 })
        ));
    }
}
