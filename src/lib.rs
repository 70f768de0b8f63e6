//! # inkstone-ocr
//!
//! An HTTP OCR service: document images and multi-page PDFs in, structured
//! recognition results out, with live progress streamed to the caller.
//!
//! The recognition model itself is opaque — a pretrained vision network
//! consumed through the narrow [`engine`] interfaces. What this crate owns is
//! the request orchestration around it: bounded upload intake, document
//! decomposition, strict serialisation of the single shared compute resource,
//! grounding-markup layout extraction, staged progress with push delivery,
//! and guaranteed scratch cleanup.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Intake     bounded chunked write into a scratch workspace
//!  ├─ 2. Decompose  PDF → page PNGs via pdfium (2×, spawn_blocking)
//!  ├─ 3. Gate       FIFO mutex — one inference call process-wide
//!  ├─ 4. Layout     <|ref|>/<|det|> markup → pixel + normalised boxes
//!  ├─ 5. Aggregate  per-page sections, first-page layout, timings
//!  └─ 6. Cleanup    scratch workspace removed on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inkstone_ocr::config::ServiceConfig;
//! use inkstone_ocr::server::{serve, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::from_env();
//!     let state = AppState::new(config.clone());
//!     // state.engine.initialize(...) — load a recognition backend here
//!     serve(state, &config.host, config.port).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `ocr-ocrs` | on      | Pure-Rust recognition backend (ocrs + rten) |
//!
//! With the feature off the crate builds the service shell only; embedders
//! inject their own [`engine::RecognitionEngine`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ModeConfig, ServiceConfig, DEFAULT_MODE};
pub use engine::{EngineHandle, EngineLoader, InferenceGate, InferenceRequest, RecognitionEngine};
pub use error::OcrError;
pub use output::{OcrResponse, PageOutcome};
pub use progress::{ProgressEvent, ProgressRecord, ProgressRegistry, Stage};
pub use server::{serve, AppState};
