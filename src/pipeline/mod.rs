//! The per-image recognition pipeline.
//!
//! Four stages in fixed linear order, each a transformation of
//! [`PipelineState`] that never lets a failure escape its own boundary:
//!
//! ```text
//! START ─▶ analyze_image ─▶ extract_text ─▶ parse_structure ─▶ validate_data ─▶ END
//!            (vision,          (vision)        (completion +       (schema
//!           informational)                      JSON recovery)      repair)
//! ```
//!
//! A stage that fails appends a message to `state.errors` and returns;
//! later stages find their input missing and record *their own* error
//! instead of crashing the page. The terminal state always comes back to
//! the caller, which inspects `errors` and `structured_data` to decide
//! what the page is worth. A page with zero entries and no hard errors is
//! a completed (empty) page, not a failure.
//!
//! Pipelines are independent: each image owns its state, and the only
//! shared object is the read-only [`crate::client::ModelClient`], which
//! must tolerate concurrent callers.

mod stages;
mod state;

pub use stages::{run_page, run_page_with_retry};
pub use state::{PipelineState, StageFlags};
