//! The four pipeline stages, the page runner, and its retry wrapper.
//!
//! Stages are plain async functions `(&dyn ModelClient, &mut PipelineState)`
//! so each is testable in isolation with a scripted client. Failure paths
//! are visible in the state, not in control flow: a stage catches every
//! failure it can produce and appends a message to `state.errors`.

use crate::client::ModelClient;
use crate::config::ExtractionConfig;
use crate::pipeline::state::PipelineState;
use crate::prompts;
use crate::recover;
use crate::validate;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Stage 1: image quality/layout analysis.
///
/// Informational only — the result is stored and logged but later stages
/// never read it, so a failure here must not block transcription.
async fn analyze_image(client: &dyn ModelClient, state: &mut PipelineState) {
    match client
        .analyze_image(&state.image_path, prompts::ANALYZE_IMAGE_PROMPT)
        .await
    {
        Ok(response) => {
            let candidate = recover::extract_json(&response);
            match serde_json::from_str::<Value>(&candidate) {
                Ok(analysis) => {
                    debug!(
                        quality = analysis.get("quality").and_then(|v| v.as_str()),
                        layout = analysis.get("layout").and_then(|v| v.as_str()),
                        "image analysis done"
                    );
                    state.analysis = Some(analysis);
                    state.stages.analysis_completed = true;
                }
                Err(e) => state
                    .errors
                    .push(format!("image analysis failed: unparseable reply: {e}")),
            }
        }
        Err(e) => state.errors.push(format!("image analysis failed: {e}")),
    }
}

/// Stage 2: transcribe the page text.
async fn extract_text(client: &dyn ModelClient, state: &mut PipelineState) {
    match client
        .extract_text(&state.image_path, prompts::EXTRACT_TEXT_PROMPT)
        .await
    {
        Ok(response) => {
            let text = response.trim().to_string();
            debug!(chars = text.len(), "text extracted");
            state.raw_text = Some(text);
            state.stages.text_extracted = true;
        }
        Err(e) => state.errors.push(format!("text extraction failed: {e}")),
    }
}

/// Stage 3: parse the transcription into raw entry objects.
///
/// The completion reply goes through the full JSON recovery path; the raw
/// (unrepaired) array is stored — schema repair is stage 4's job.
async fn parse_structure(
    client: &dyn ModelClient,
    config: &ExtractionConfig,
    state: &mut PipelineState,
) {
    let Some(raw_text) = state.raw_text.as_deref() else {
        state
            .errors
            .push("structure parsing skipped: nothing to parse".into());
        return;
    };

    let template = config
        .parse_prompt
        .as_deref()
        .unwrap_or(prompts::PARSE_STRUCTURE_PROMPT);
    let prompt = prompts::parse_structure_prompt(template, raw_text);

    match client.complete(&prompt).await {
        Ok(response) => match recover::parse_entry_array(&response) {
            Ok(entries) => {
                debug!(entries = entries.len(), "structure parsed");
                state.structured_data = Some(entries);
                state.stages.structure_parsed = true;
            }
            Err(e) => state.errors.push(format!("structure parsing failed: {e}")),
        },
        Err(e) => state.errors.push(format!("structure parsing failed: {e}")),
    }
}

/// Stage 4: validate and repair the raw entries.
///
/// Always stores the full [`crate::model::ValidationResult`]; unless the
/// result is invalid, `structured_data` is replaced with the repaired
/// entries so downstream consumers see clean data.
fn validate_data(state: &mut PipelineState) {
    let Some(raw) = state.structured_data.as_deref() else {
        state
            .errors
            .push("validation skipped: nothing to validate".into());
        return;
    };

    let result = validate::validate(raw);
    debug!(
        status = ?result.status,
        warnings = result.warnings.len(),
        errors = result.errors.len(),
        "validation done"
    );

    if result.is_usable() {
        state.structured_data = Some(
            result
                .data
                .iter()
                .map(|e| serde_json::json!({"title": e.title, "page": e.page, "level": e.level}))
                .collect(),
        );
    }
    state.stages.validation_completed = true;
    state.validation = Some(result);
}

/// Run all four stages over one page image.
///
/// Always returns the terminal state, whatever accumulated in `errors`.
pub async fn run_page(
    client: &dyn ModelClient,
    config: &ExtractionConfig,
    image_path: &std::path::Path,
) -> PipelineState {
    let mut state = PipelineState::new(image_path);
    info!(image = %image_path.display(), "pipeline start");

    analyze_image(client, &mut state).await;
    extract_text(client, &mut state).await;
    parse_structure(client, config, &mut state).await;
    validate_data(&mut state);

    info!(
        image = %image_path.display(),
        entries = state.entry_count(),
        errors = state.errors.len(),
        "pipeline done"
    );
    state
}

/// Run a page pipeline with the configured retry policy.
///
/// A run is accepted immediately when it produced non-empty entries and no
/// errors; otherwise the next attempt starts after an exponentially
/// doubling delay. When attempts are exhausted the last (possibly
/// partial/errored) state is returned rather than failing the caller.
pub async fn run_page_with_retry(
    client: &dyn ModelClient,
    config: &ExtractionConfig,
    image_path: &std::path::Path,
) -> PipelineState {
    let attempts = config.max_retries.max(1);
    let mut delay_ms = config.retry_backoff_ms;

    for attempt in 1..attempts {
        let state = run_page(client, config, image_path).await;

        if state.is_clean_success() {
            return state;
        }

        warn!(
            image = %image_path.display(),
            attempt,
            of = attempts,
            delay_ms,
            errors = ?state.errors,
            "page run unusable, retrying"
        );
        sleep(Duration::from_millis(delay_ms)).await;
        delay_ms = delay_ms.saturating_mul(2);
    }

    // Final attempt: whatever it produced is what the caller gets.
    let state = run_page(client, config, image_path).await;
    if !state.is_clean_success() {
        warn!(
            image = %image_path.display(),
            attempts,
            "page run still unusable after final attempt"
        );
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ModelClient;
    use crate::error::TocError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted client: fixed analyze/extract replies, a queue of
    /// completion replies consumed one per call.
    struct ScriptedClient {
        analyze: Result<String, String>,
        extract: Result<String, String>,
        completions: Mutex<Vec<Result<String, String>>>,
        complete_calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn ok(analyze: &str, extract: &str, completion: &str) -> Self {
            Self {
                analyze: Ok(analyze.into()),
                extract: Ok(extract.into()),
                completions: Mutex::new(vec![Ok(completion.into())]),
                complete_calls: AtomicUsize::new(0),
            }
        }
    }

    fn model_err(m: &str) -> TocError {
        TocError::Model { message: m.into() }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn analyze_image(&self, _: &Path, _: &str) -> Result<String, TocError> {
            self.analyze.clone().map_err(|m| model_err(&m))
        }
        async fn extract_text(&self, _: &Path, _: &str) -> Result<String, TocError> {
            self.extract.clone().map_err(|m| model_err(&m))
        }
        async fn complete(&self, _: &str) -> Result<String, TocError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            let mut q = self.completions.lock().unwrap();
            if q.len() > 1 {
                q.remove(0).map_err(|m| model_err(&m))
            } else {
                q[0].clone().map_err(|m| model_err(&m))
            }
        }
    }

    fn fast_config() -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(3)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    const GOOD_ANALYSIS: &str = r#"{"quality":"clear","layout":"single_column"}"#;
    const GOOD_TEXT: &str = "Chapter 1 ..... 1\n  Section 1.1 ..... 3";
    const GOOD_ENTRIES: &str =
        r#"[{"title":"Chapter 1","page":1,"level":1},{"title":"Section 1.1","page":3,"level":2}]"#;

    #[tokio::test]
    async fn happy_path_fills_every_field() {
        let client = ScriptedClient::ok(GOOD_ANALYSIS, GOOD_TEXT, GOOD_ENTRIES);
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        assert!(state.errors.is_empty(), "{:?}", state.errors);
        assert!(state.analysis.is_some());
        assert_eq!(state.raw_text.as_deref(), Some(GOOD_TEXT));
        assert_eq!(state.entry_count(), 2);
        assert!(state.stages.validation_completed);
        assert!(state.is_clean_success());
    }

    #[tokio::test]
    async fn analyze_failure_does_not_block_extraction() {
        let client = ScriptedClient {
            analyze: Err("connection reset".into()),
            extract: Ok(GOOD_TEXT.into()),
            completions: Mutex::new(vec![Ok(GOOD_ENTRIES.into())]),
            complete_calls: AtomicUsize::new(0),
        };
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("image analysis failed"));
        assert!(state.analysis.is_none());
        // Later stages still ran.
        assert_eq!(state.entry_count(), 2);
        assert!(state.stages.structure_parsed);
    }

    #[tokio::test]
    async fn missing_text_records_nothing_to_parse() {
        let client = ScriptedClient {
            analyze: Ok(GOOD_ANALYSIS.into()),
            extract: Err("timeout".into()),
            completions: Mutex::new(vec![Ok(GOOD_ENTRIES.into())]),
            complete_calls: AtomicUsize::new(0),
        };
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        assert!(state.raw_text.is_none());
        assert!(state.errors.iter().any(|e| e.contains("nothing to parse")));
        assert!(state.errors.iter().any(|e| e.contains("nothing to validate")));
        // The completion stage must not have been reached.
        assert_eq!(client.complete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.entry_count(), 0);
    }

    #[tokio::test]
    async fn non_array_reply_is_a_format_error() {
        let client = ScriptedClient::ok(GOOD_ANALYSIS, GOOD_TEXT, r#"{"title":"A"}"#);
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        assert!(state
            .errors
            .iter()
            .any(|e| e.contains("expected a JSON array")));
        assert!(state.structured_data.is_none());
    }

    #[tokio::test]
    async fn truncated_reply_recovers_prefix() {
        let truncated = r#"```json
[{"title":"A","page":1,"level":1},{"title":"B","page":2,"le"#;
        let client = ScriptedClient::ok(GOOD_ANALYSIS, GOOD_TEXT, truncated);
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        assert_eq!(state.entry_count(), 1);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn validation_replaces_entries_with_repaired_ones() {
        let needs_fixes = r#"[{"title":" Ch1 ","page":0,"level":0}]"#;
        let client = ScriptedClient::ok(GOOD_ANALYSIS, GOOD_TEXT, needs_fixes);
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        let entries = state.structured_data.as_ref().unwrap();
        assert_eq!(entries[0]["title"], "Ch1");
        assert_eq!(entries[0]["page"], 1);
        assert_eq!(entries[0]["level"], 1);
        let validation = state.validation.as_ref().unwrap();
        assert_eq!(validation.warnings.len(), 2);
    }

    #[tokio::test]
    async fn invalid_validation_keeps_raw_entries() {
        let broken = r#"[{"page":1,"level":1}]"#;
        let client = ScriptedClient::ok(GOOD_ANALYSIS, GOOD_TEXT, broken);
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        let validation = state.validation.as_ref().unwrap();
        assert!(!validation.is_usable());
        // Raw data untouched when validation is invalid.
        let entries = state.structured_data.as_ref().unwrap();
        assert!(entries[0].get("title").is_none());
    }

    #[tokio::test]
    async fn retry_accepts_second_attempt() {
        let client = ScriptedClient {
            analyze: Ok(GOOD_ANALYSIS.into()),
            extract: Ok(GOOD_TEXT.into()),
            completions: Mutex::new(vec![Err("503".into()), Ok(GOOD_ENTRIES.into())]),
            complete_calls: AtomicUsize::new(0),
        };
        let state = run_page_with_retry(&client, &fast_config(), Path::new("page_7.png")).await;

        assert!(state.is_clean_success());
        assert_eq!(client.complete_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_exhaustion_returns_last_state() {
        let client = ScriptedClient {
            analyze: Ok(GOOD_ANALYSIS.into()),
            extract: Ok(GOOD_TEXT.into()),
            completions: Mutex::new(vec![Err("down".into())]),
            complete_calls: AtomicUsize::new(0),
        };
        let state = run_page_with_retry(&client, &fast_config(), Path::new("page_7.png")).await;

        assert!(!state.is_clean_success());
        assert!(state.errors.iter().any(|e| e.contains("down")));
        assert_eq!(client.complete_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_entry_page_is_completed_not_failed() {
        let client = ScriptedClient::ok(GOOD_ANALYSIS, "no toc content here", "[]");
        let state = run_page(&client, &fast_config(), Path::new("page_7.png")).await;

        assert!(state.errors.is_empty());
        assert_eq!(state.entry_count(), 0);
        assert!(state.stages.validation_completed);
    }
}
