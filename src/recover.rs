//! Tolerant JSON recovery: turn a free-form model reply into a parseable
//! JSON payload.
//!
//! ## Why is recovery necessary?
//!
//! Even well-prompted models wrap their JSON in markdown fences, preface it
//! with "Here is the table of contents:", append ellipsis markers when they
//! get bored, or simply run out of output budget mid-array. Refusing such
//! replies would throw away pages that are 95% usable. This module instead
//! applies a small ordered chain of pure extraction strategies followed by
//! deterministic cleanup, and — when parsing still fails — cuts the
//! candidate back to the last complete array element and closes it.
//!
//! ## Strategy order
//!
//! 1. First fenced block (```json … ```), accepted only when the fenced
//!    body starts with `[` or `{`
//! 2. First `[` … last `]` slice
//! 3. First `{` … last `}` slice
//! 4. The text verbatim — parsing will fail, but the diagnostic then
//!    carries the original content
//!
//! The first strategy that produces a candidate wins; later ones are never
//! consulted. [`extract_json`] is total: it always returns *some* string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Extract the most plausible JSON payload from a model reply.
///
/// Never fails; callers attempt to parse the result and handle parse
/// failure separately (see [`parse_entry_array`]).
pub fn extract_json(response: &str) -> String {
    let response = response.trim();

    let strategies: [fn(&str) -> Option<&str>; 3] =
        [fenced_block, bracketed_array, braced_object];

    for strategy in strategies {
        if let Some(candidate) = strategy(response) {
            return clean_json(candidate);
        }
    }

    response.to_string()
}

/// Strategy 1: the body of the *first* fenced block, if it looks like JSON.
fn fenced_block(response: &str) -> Option<&str> {
    let fence = response.find("```")?;

    // Skip the fence marker and an optional language tag. The tag ends at
    // the first newline; a fence with no newline at all degrades to
    // skipping a literal "json" suffix.
    let mut body_start = match response[fence..].find('\n') {
        Some(nl) => fence + nl + 1,
        None => {
            let mut s = fence + 3;
            if response[s..].starts_with("json") {
                s += 4;
            }
            s
        }
    };
    if body_start > response.len() {
        body_start = response.len();
    }

    let body_end = response[body_start..].find("```")? + body_start;
    let body = response[body_start..body_end].trim();

    if body.starts_with('[') || body.starts_with('{') {
        Some(body)
    } else {
        None
    }
}

/// Strategy 2: the widest `[...]` slice.
fn bracketed_array(response: &str) -> Option<&str> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    (end > start).then(|| &response[start..=end])
}

/// Strategy 3: the widest `{...}` slice.
fn braced_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

static RE_TRAILING_ELLIPSIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",?\s*\.{3,}\s*$").unwrap());
static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([\]\}])").unwrap());
static RE_DANGLING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*$").unwrap());

/// Deterministic cleanup of a JSON candidate.
///
/// Fixes the model quirks that are cheap to repair without a parser:
/// a trailing `...` truncation marker, trailing commas before a closing
/// bracket, and an array/object that was cut off before its terminator.
///
/// Idempotent: running it twice yields the same string.
pub fn clean_json(candidate: &str) -> String {
    let mut s = candidate.trim().to_string();

    s = RE_TRAILING_ELLIPSIS.replace(&s, "").into_owned();
    s = RE_TRAILING_COMMA.replace_all(&s, "$1").into_owned();

    if s.starts_with('[') && !s.trim_end().ends_with(']') {
        // Cut back to the last complete object, then close the array.
        if let Some(last_brace) = s.rfind('}') {
            s.truncate(last_brace + 1);
            s.push_str("\n]");
        }
    } else if s.starts_with('{') && !s.trim_end().ends_with('}') {
        let last_brace = s.rfind('}');
        let last_quote = s.rfind('"');
        match (last_brace, last_quote) {
            // A nested object closed after the last string: everything
            // beyond it is a torn field — drop it.
            (Some(b), Some(q)) if b > q => s.truncate(b + 1),
            _ => s.push_str("\n}"),
        }
    }

    s
}

/// Close an array that lost its `]` to output truncation.
///
/// Cuts at the last complete object boundary, strips a dangling comma, and
/// appends the terminator. No-op unless the string starts with `[` and is
/// not already closed.
pub fn repair_truncated_array(candidate: &str) -> String {
    let s = candidate.trim();

    if !s.starts_with('[') || s.ends_with(']') {
        return s.to_string();
    }

    let Some(last_brace) = s.rfind('}') else {
        return s.to_string();
    };

    let mut fixed = s[..=last_brace].to_string();
    fixed = RE_DANGLING_COMMA.replace(&fixed, "").into_owned();
    fixed.push_str("\n]");
    fixed
}

/// Byte offset one past the last *complete* top-level element of an array.
///
/// A string/escape-aware depth scan, so braces inside titles cannot confuse
/// it. Returns the offset just past the array's own `]` when the array is
/// complete (trailing garbage after it is thereby discarded), or past the
/// last element that closed cleanly when it is not.
fn last_complete_element_end(s: &str) -> Option<usize> {
    debug_assert!(s.starts_with('['));

    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut last_end = None;

    for (i, b) in s.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
                if depth == 1 {
                    // Bare string element at array top level.
                    last_end = Some(i + 1);
                }
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
                if depth == 1 {
                    last_end = Some(i + 1);
                }
            }
            _ => {}
        }
    }

    last_end
}

/// Why a model reply could not be coerced into an entry array.
///
/// Carries excerpts of both the raw reply and the extracted candidate so a
/// log line is enough to diagnose what the model actually said.
#[derive(Debug, Error)]
#[error("{message} (raw: {raw_excerpt:?}, candidate: {candidate_excerpt:?})")]
pub struct ParseFailure {
    pub message: String,
    pub raw_excerpt: String,
    pub candidate_excerpt: String,
}

impl ParseFailure {
    fn new(message: impl Into<String>, raw: &str, candidate: &str) -> Self {
        Self {
            message: message.into(),
            raw_excerpt: excerpt(raw),
            candidate_excerpt: excerpt(candidate),
        }
    }
}

/// First/last slice of a string for diagnostics, char-boundary safe.
fn excerpt(s: &str) -> String {
    const HEAD: usize = 80;
    const TAIL: usize = 40;
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= HEAD + TAIL {
        return s.to_string();
    }
    let head: String = chars[..HEAD].iter().collect();
    let tail: String = chars[chars.len() - TAIL..].iter().collect();
    format!("{head}…{tail}")
}

/// Extract and parse a model reply that is expected to contain a JSON
/// array of raw entry objects.
///
/// Runs [`extract_json`], parses, and on failure retries once after
/// cutting the candidate at the last complete top-level element found by
/// [`last_complete_element_end`] and re-closing the array — recovering a
/// valid prefix of entries when the model appended garbage after a
/// complete array or ran out of output budget before the terminator.
///
/// The entries are returned *raw* (unvalidated `serde_json::Value`s);
/// schema repair belongs to [`crate::validate::validate`].
pub fn parse_entry_array(response: &str) -> Result<Vec<Value>, ParseFailure> {
    let candidate = extract_json(response);

    let first_err = match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Array(items)) => return Ok(items),
        Ok(other) => {
            return Err(ParseFailure::new(
                format!("expected a JSON array, got {}", json_kind(&other)),
                response,
                &candidate,
            ))
        }
        Err(e) => e,
    };

    // Truncation / trailing-garbage recovery on array candidates.
    let trimmed = candidate.trim();
    if trimmed.starts_with('[') {
        if let Some(end) = last_complete_element_end(trimmed) {
            let repaired = repair_truncated_array(&trimmed[..end]);
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&repaired) {
                if !items.is_empty() {
                    tracing::info!(
                        recovered = items.len(),
                        "repaired truncated entry array"
                    );
                    return Ok(items);
                }
            }
        }
    }

    // Last resort: a reply that ran out of output budget loses both its
    // closing fence and its ']', so no strategy yields an array candidate.
    // Scan from the first '[' of the raw reply instead.
    if let Some(start) = response.find('[') {
        let tail = &response[start..];
        if let Some(end) = last_complete_element_end(tail) {
            let repaired = repair_truncated_array(&tail[..end]);
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&repaired) {
                if !items.is_empty() {
                    tracing::info!(
                        recovered = items.len(),
                        "recovered entry prefix from unterminated reply"
                    );
                    return Ok(items);
                }
            }
        }
    }

    Err(ParseFailure::new(
        format!("JSON parse failed: {first_err}"),
        response,
        &candidate,
    ))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
