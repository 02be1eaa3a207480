//! The PDF capability: everything that touches the document itself.
//!
//! Split by library because the two halves have nothing in common:
//!
//! * [`render`] rasterises TOC pages via **pdfium** (CPU-bound, runs in
//!   `spawn_blocking` because pdfium is not async-safe).
//! * [`write`] reads and writes the outline tree via **lopdf** — pdfium
//!   has no bookmark-writing API, and outline surgery is pure object-graph
//!   work that lopdf handles without a native library.
//!
//! [`input`] sits in front of both, normalising a user-supplied path or
//! URL into a validated local PDF file.

pub mod input;
pub mod render;
pub mod write;

pub use input::{resolve_input, ResolvedInput};
pub use render::{page_count, render_range};
pub use write::{
    existing_outline, has_outline, validate_before_write, write_outline, write_outline_safely,
};
