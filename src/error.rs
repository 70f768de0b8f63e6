//! Error types for the inkstone-ocr service.
//!
//! One enum covers the whole request pipeline. The split that matters here is
//! client-caused vs. server-caused: the first group maps to HTTP 400 and is
//! detected before any compute resource is touched, the second maps to 500.
//! Display strings are the exact messages the API has always returned, so the
//! (Chinese) frontend can keep rendering them verbatim.
//!
//! Per-page layout extraction failures are deliberately NOT represented here:
//! they degrade to empty [`crate::pipeline::layout::LayoutMetadata`] instead
//! of failing the page (see `pipeline::layout`).

use thiserror::Error;

/// All errors produced by the OCR request pipeline.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Client-caused (HTTP 400) ─────────────────────────────────────────
    /// Bad or missing input, e.g. no file part in the upload form.
    #[error("{0}")]
    Validation(String),

    /// The upload exceeded the configured maximum size.
    #[error("图片体积超过限制（{limit_mb:.1} MB）。")]
    SizeLimitExceeded { limit_mb: f64 },

    /// The declared media type is neither image-like nor a PDF.
    #[error("仅支持图片或 PDF 文件。")]
    UnsupportedMediaType,

    /// The document could not be opened or contained zero pages.
    #[error("无法解析 PDF 文件内容。")]
    Decomposition { detail: String },

    // ── Server-caused (HTTP 500) ─────────────────────────────────────────
    /// The recognition engine has not completed its one-time load.
    #[error("模型尚未加载完成。")]
    ModelNotReady,

    /// The requested mode key is not in the configuration table.
    #[error("不支持的模式: {0}")]
    InvalidMode(String),

    /// The engine failed, or returned no output for a page.
    #[error("推理失败: {detail}")]
    Inference { detail: String },

    /// Underlying filesystem write failure while persisting an upload.
    #[error("保存图片失败: {detail}")]
    Storage { detail: String },

    /// One-time engine load failed (missing model files, bad weights).
    /// Surfaces in the startup log only; requests see [`OcrError::ModelNotReady`].
    #[error("模型加载失败: {detail}")]
    EngineLoad { detail: String },

    /// Unexpected internal error (task join failures and the like).
    #[error("内部错误: {0}")]
    Internal(String),
}

impl OcrError {
    /// Engine returned `None`, i.e. produced no output at all.
    pub fn empty_inference() -> Self {
        OcrError::Inference {
            detail: "推理返回为空。".to_string(),
        }
    }

    /// HTTP status this error maps to. Kept as a bare `u16` so the error
    /// module stays framework-free; the server layer converts it.
    pub fn http_status(&self) -> u16 {
        match self {
            OcrError::Validation(_)
            | OcrError::SizeLimitExceeded { .. }
            | OcrError::UnsupportedMediaType
            | OcrError::Decomposition { .. } => 400,
            OcrError::ModelNotReady
            | OcrError::InvalidMode(_)
            | OcrError::Inference { .. }
            | OcrError::Storage { .. }
            | OcrError::EngineLoad { .. }
            | OcrError::Internal(_) => 500,
        }
    }
}
