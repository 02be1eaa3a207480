//! Prompts for the three model calls the page pipeline makes.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening a rule (e.g. how dotted
//!    leaders are handled) means editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts and exercise the
//!    template substitution without a live model.
//!
//! Callers can override the structure-parsing prompt via
//! [`crate::config::ExtractionConfig::parse_prompt`]; the constants here
//! are used when no override is provided.

/// Prompt for the informational image-quality/layout analysis call.
///
/// The reply is expected to be a single JSON object; it is logged and
/// stored but never gates later stages.
pub const ANALYZE_IMAGE_PROMPT: &str = r#"You are inspecting a scanned page from a book's table of contents.

Describe the image as a single JSON object with exactly these fields:

{
  "quality": "clear" | "blurry" | "poor",
  "layout": "single_column" | "two_column" | "multi_column",
  "has_header": boolean,
  "has_footer": boolean,
  "indentation_present": boolean,
  "estimated_entries": integer,
  "notes": string
}

Output ONLY the JSON object. No commentary, no markdown fences."#;

/// Prompt for the raw text transcription call.
pub const EXTRACT_TEXT_PROMPT: &str = r#"Transcribe ALL text visible on this table-of-contents page.

Rules:
1. Preserve the reading order exactly as printed.
2. Keep each TOC line on its own line, including its page number.
3. Preserve leading indentation — it encodes the heading hierarchy.
4. Keep dotted leaders (.....) or whatever separates titles from page numbers.
5. Do NOT summarise, merge, or reformat lines.
6. Do NOT add commentary.

Output only the transcribed text."#;

/// Template for the structure-parsing completion call.
///
/// `{raw_text}` is replaced with the transcription before sending; use
/// [`parse_structure_prompt`] rather than substituting by hand.
pub const PARSE_STRUCTURE_PROMPT: &str = r#"Below is the transcribed text of one page from a book's table of contents.
Convert it into a JSON array of entries.

Each entry is an object:
  {"title": string, "page": integer, "level": integer}

Rules:
1. "title" is the heading text without dotted leaders or the page number.
2. "page" is the printed page number on that line. Use the number as printed.
3. "level" is the nesting depth from indentation and numbering: 1 for
   chapters/parts, 2 for sections, 3 for subsections, up to 5.
4. Skip lines that are not TOC entries (running heads, decorations).
5. Output ONLY the JSON array — no commentary, no markdown fences, and do
   not truncate with "...".

Transcribed text:
"""
{raw_text}
"""
"#;

/// Substitute the transcription into [`PARSE_STRUCTURE_PROMPT`] (or an
/// override template using the same `{raw_text}` placeholder).
pub fn parse_structure_prompt(template: &str, raw_text: &str) -> String {
    template.replace("{raw_text}", raw_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitution() {
        let prompt = parse_structure_prompt(PARSE_STRUCTURE_PROMPT, "Chapter 1 .... 5");
        assert!(prompt.contains("Chapter 1 .... 5"));
        assert!(!prompt.contains("{raw_text}"));
    }

    #[test]
    fn prompts_demand_bare_json() {
        assert!(ANALYZE_IMAGE_PROMPT.contains("ONLY the JSON object"));
        assert!(PARSE_STRUCTURE_PROMPT.contains("ONLY the JSON array"));
    }
}
