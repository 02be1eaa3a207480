//! Working state threaded through the four pipeline stages.

use crate::model::ValidationResult;
use serde_json::Value;
use std::path::PathBuf;

/// Which stages have completed, regardless of outcome quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    pub analysis_completed: bool,
    pub text_extracted: bool,
    pub structure_parsed: bool,
    pub validation_completed: bool,
}

/// Per-image working state.
///
/// Created by [`PipelineState::new`], mutated in place by each stage,
/// never shared across images. Fields stay `None` when the stage that
/// fills them failed; the corresponding failure is in `errors`.
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// Path of the page image being processed.
    pub image_path: PathBuf,
    /// Raw transcription from the vision model.
    pub raw_text: Option<String>,
    /// Raw entry objects as parsed from the model reply; replaced with the
    /// repaired entries once validation passes.
    pub structured_data: Option<Vec<Value>>,
    /// Informational image-quality/layout analysis.
    pub analysis: Option<Value>,
    /// Full validation outcome, including warnings for repaired fields.
    pub validation: Option<ValidationResult>,
    /// Accumulated stage failures, in occurrence order.
    pub errors: Vec<String>,
    pub stages: StageFlags,
}

impl PipelineState {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            raw_text: None,
            structured_data: None,
            analysis: None,
            validation: None,
            errors: Vec::new(),
            stages: StageFlags::default(),
        }
    }

    /// A run is acceptable when it produced entries and hit no errors.
    ///
    /// This is the retry-loop acceptance condition, deliberately stricter
    /// than "usable": a page with partial entries *and* errors gets
    /// another chance.
    pub fn is_clean_success(&self) -> bool {
        self.errors.is_empty()
            && self
                .structured_data
                .as_ref()
                .is_some_and(|d| !d.is_empty())
    }

    /// Number of entries currently held, repaired or raw.
    pub fn entry_count(&self) -> usize {
        self.structured_data.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_state_is_not_a_success() {
        let state = PipelineState::new("page_7.png");
        assert!(!state.is_clean_success());
        assert_eq!(state.entry_count(), 0);
        assert!(state.errors.is_empty());
    }

    #[test]
    fn entries_without_errors_is_success() {
        let mut state = PipelineState::new("page_7.png");
        state.structured_data = Some(vec![json!({"title": "A", "page": 1, "level": 1})]);
        assert!(state.is_clean_success());
    }

    #[test]
    fn entries_with_errors_is_not_success() {
        let mut state = PipelineState::new("page_7.png");
        state.structured_data = Some(vec![json!({"title": "A", "page": 1, "level": 1})]);
        state.errors.push("image analysis failed: timeout".into());
        assert!(!state.is_clean_success());
    }

    #[test]
    fn empty_entry_list_is_not_success() {
        let mut state = PipelineState::new("page_7.png");
        state.structured_data = Some(vec![]);
        assert!(!state.is_clean_success());
    }
}
