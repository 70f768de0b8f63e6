//! Response types for the HTTP API.
//!
//! Field names serialize in camelCase because that is the wire contract the
//! frontend was built against. These types are assembled by the orchestrator
//! and never deserialized, so only `Serialize` is derived.

use crate::pipeline::layout::LayoutMetadata;
use serde::Serialize;

/// One page's recognition outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutcome {
    /// Zero-based page index within the document.
    pub page_index: usize,
    /// Cleaned model output (end-of-sequence markers stripped).
    pub text: String,
    /// Raw model output, markup included.
    pub raw_text: String,
    /// Region layout extracted from the raw output, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutMetadata>,
    /// Base64 data URL of the page image. Present only for pages that were
    /// decomposed out of a PDF; single-image requests already hold the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    /// Inference wall-clock for this page, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

/// The full OCR response for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    /// Mode key the job ran with.
    pub mode: String,
    /// Effective prompt after normalisation.
    pub prompt: String,
    /// Aggregate cleaned text, one `## 第 N 页` section per page.
    pub text: String,
    /// Aggregate raw text, one `[Page N]` section per page.
    pub raw_text: String,
    /// Total wall-clock from validation to response assembly, milliseconds.
    pub duration_ms: f64,
    /// Original upload filename.
    pub file_name: String,
    /// Original upload size in bytes.
    pub file_size: u64,
    /// First page's layout. Per-page layouts are in `pages`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutMetadata>,
    /// Per-page outcomes in page order.
    pub pages: Vec<PageOutcome>,
}

/// `GET /health` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub modes: Vec<&'static str>,
}

/// `POST /api/task/create` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    pub task_id: String,
}
