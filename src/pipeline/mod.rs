//! Pipeline stages for one OCR job.
//!
//! Each submodule implements exactly one transformation step, independently
//! testable without the HTTP layer or a loaded engine.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ decompose ──▶ [per page: gate/engine] ──▶ layout
//! (bounded   (PDF → page    (serialized inference)     (markup → boxes)
//!  upload)    images)
//! ```
//!
//! 1. [`intake`]    — classify the declared media type and stream the upload
//!    into a scratch workspace, aborting the moment the size limit is crossed
//! 2. [`decompose`] — turn a document into an ordered page-image sequence;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`layout`]    — parse grounding markup out of raw engine output into
//!    pixel-accurate and normalised bounding boxes

pub mod decompose;
pub mod intake;
pub mod layout;
