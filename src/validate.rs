//! Schema validation and repair of raw model-produced entries.
//!
//! The model is asked for `{title, page, level}` objects but routinely
//! returns near-misses: a page of `0` (off-by-one on roman-numbered front
//! matter), a level of `0` or `7`, whitespace-padded titles. The policy is
//! repair-not-reject wherever the intent is unambiguous, and drop-with-error
//! only when a required field is missing outright.
//!
//! [`validate`] never panics and never returns `Err`; every anomaly is
//! carried in the returned [`ValidationResult`] as a warning (repaired) or
//! error (dropped).

use crate::model::{TocEntry, ValidationResult, ValidationStatus, MAX_LEVEL, MIN_LEVEL};
use serde_json::Value;

/// Validate and repair a list of raw entry objects.
///
/// Per entry: `title`, `page`, and `level` must all be present — a missing
/// field records an indexed error and skips the entry. Present entries are
/// repaired in place: the title is trimmed, a page of exactly `0` becomes
/// `1`, and out-of-range levels are clamped into `1..=5`; each repair is
/// recorded as a warning naming the original and corrected value.
///
/// `data` holds only the surviving entries, in original order. Status
/// follows from the accumulators: any error ⇒ `Invalid`; otherwise any
/// warning ⇒ `ValidWithFixes`; otherwise `Valid`.
pub fn validate(raw_entries: &[Value]) -> ValidationResult {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let mut data = Vec::with_capacity(raw_entries.len());

    for (i, entry) in raw_entries.iter().enumerate() {
        let n = i + 1;

        let (title, page, level) = match required_fields(entry) {
            Some(fields) => fields,
            None => {
                errors.push(format!(
                    "entry {n}: missing required field(s) among title/page/level"
                ));
                continue;
            }
        };

        let title = title.trim().to_string();
        if title.is_empty() {
            errors.push(format!("entry {n}: title is empty"));
            continue;
        }

        let page = if page == 0 {
            warnings.push(format!("entry {n}: page corrected from 0 to 1"));
            1
        } else {
            page
        };

        let level = if level < i64::from(MIN_LEVEL) {
            warnings.push(format!(
                "entry {n}: level corrected from {level} to {MIN_LEVEL}"
            ));
            MIN_LEVEL
        } else if level > i64::from(MAX_LEVEL) {
            warnings.push(format!(
                "entry {n}: level corrected from {level} to {MAX_LEVEL}"
            ));
            MAX_LEVEL
        } else {
            level as u8
        };

        // Fields are clamped, so construction cannot fail here.
        match TocEntry::new(title, page, level) {
            Ok(e) => data.push(e),
            Err(e) => errors.push(format!("entry {n}: {e}")),
        }
    }

    let status = if !errors.is_empty() {
        ValidationStatus::Invalid
    } else if !warnings.is_empty() {
        ValidationStatus::ValidWithFixes
    } else {
        ValidationStatus::Valid
    };

    ValidationResult {
        status,
        data,
        warnings,
        errors,
    }
}

/// Pull `(title, page, level)` out of a raw entry object.
///
/// Accepts integral floats for the numeric fields (some models emit
/// `"page": 12.0`); anything else counts as missing.
fn required_fields(entry: &Value) -> Option<(&str, i64, i64)> {
    let obj = entry.as_object()?;
    let title = obj.get("title")?.as_str()?;
    let page = integral(obj.get("page")?)?;
    let level = integral(obj.get("level")?)?;
    Some((title, page, level))
}

fn integral(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let f = v.as_f64()?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_entries_pass_unchanged() {
        let raw = vec![
            json!({"title": "Chapter 1", "page": 1, "level": 1}),
            json!({"title": "Section 1.1", "page": 3, "level": 2}),
        ];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert_eq!(result.data.len(), 2);
        assert!(result.warnings.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn page_zero_and_level_zero_are_repaired() {
        let raw = vec![json!({"title": " Ch1 ", "page": 0, "level": 0})];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::ValidWithFixes);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].title, "Ch1");
        assert_eq!(result.data[0].page, 1);
        assert_eq!(result.data[0].level, 1);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn missing_title_drops_entry() {
        let raw = vec![json!({"page": 1, "level": 1})];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert!(result.data.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("entry 1"));
    }

    #[test]
    fn level_above_max_is_clamped() {
        let raw = vec![json!({"title": "Deep", "page": 9, "level": 7})];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::ValidWithFixes);
        assert_eq!(result.data[0].level, 5);
        assert!(result.warnings[0].contains("from 7 to 5"));
    }

    #[test]
    fn bad_entry_does_not_block_good_ones() {
        let raw = vec![
            json!({"title": "Good", "page": 2, "level": 1}),
            json!({"level": 1, "page": 5}),
            json!({"title": "Also good", "page": 8, "level": 2}),
        ];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert_eq!(result.data.len(), 2);
        assert_eq!(result.data[0].title, "Good");
        assert_eq!(result.data[1].title, "Also good");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("entry 2"));
    }

    #[test]
    fn whitespace_only_title_is_an_error() {
        let raw = vec![json!({"title": "   ", "page": 1, "level": 1})];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert!(result.data.is_empty());
    }

    #[test]
    fn float_pages_with_integral_value_are_accepted() {
        let raw = vec![json!({"title": "Ch", "page": 12.0, "level": 2.0})];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert_eq!(result.data[0].page, 12);
        assert_eq!(result.data[0].level, 2);
    }

    #[test]
    fn non_object_entry_is_an_error() {
        let raw = vec![json!("just a string")];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert!(result.data.is_empty());
    }

    #[test]
    fn negative_pages_survive_validation() {
        // Negative pages are filtered at merge time, not here.
        let raw = vec![json!({"title": "Weird", "page": -3, "level": 1})];
        let result = validate(&raw);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert_eq!(result.data[0].page, -3);
    }

    #[test]
    fn empty_input_is_valid_and_empty() {
        let result = validate(&[]);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert!(result.data.is_empty());
    }
}
