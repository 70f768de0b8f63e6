//! The job orchestrator: one OCR request from stored upload to response.
//!
//! Control flow over one request:
//!
//! ```text
//! decompose ──▶ { per page: gate-wait ─▶ infer ─▶ extract layout } ──▶ aggregate
//! ```
//!
//! with progress pushed at every stage boundary and scratch cleanup
//! guaranteed on every exit path. Any per-page failure aborts the whole job
//! (no partial multi-page responses); per-page *layout* failures do not —
//! they degrade to empty metadata inside the page.

use crate::config::{mode_config, ServiceConfig};
use crate::engine::{InferenceGate, InferenceRequest};
use crate::error::OcrError;
use crate::output::{OcrResponse, PageOutcome};
use crate::pipeline::decompose::decompose;
use crate::pipeline::intake::{MediaKind, StoredUpload};
use crate::pipeline::layout;
use crate::progress::{ProgressRegistry, Stage};
use crate::prompts;
use crate::workspace::ScratchWorkspace;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Input half of a job, as assembled by the upload handler.
#[derive(Debug)]
pub struct JobRequest {
    pub upload: StoredUpload,
    pub mode_key: String,
    pub prompt: String,
    pub task_id: Option<String>,
    /// Wall-clock origin for the reported duration: the moment the upload
    /// passed media-type validation.
    pub started: Instant,
}

/// Run one job to completion.
///
/// The scratch workspace is released unconditionally after the outcome is
/// determined, success or failure.
pub async fn run(
    config: &ServiceConfig,
    gate: &InferenceGate,
    progress: &ProgressRegistry,
    request: JobRequest,
) -> Result<OcrResponse, OcrError> {
    let JobRequest {
        upload,
        mode_key,
        prompt,
        task_id,
        started,
    } = request;
    let task_id = task_id.as_deref();

    if let Some(id) = task_id {
        progress.begin(id).await;
    }

    let result = execute(
        config,
        gate,
        progress,
        task_id,
        &upload.workspace,
        &upload.path,
        upload.media,
        &mode_key,
        &prompt,
        &upload.file_name,
        upload.size,
        started,
    )
    .await;

    upload.workspace.cleanup();
    result
}

#[allow(clippy::too_many_arguments)]
async fn execute(
    config: &ServiceConfig,
    gate: &InferenceGate,
    progress: &ProgressRegistry,
    task_id: Option<&str>,
    workspace: &ScratchWorkspace,
    input: &Path,
    media: MediaKind,
    mode_key: &str,
    prompt: &str,
    file_name: &str,
    file_size: u64,
    started: Instant,
) -> Result<OcrResponse, OcrError> {
    let effective_prompt = prompts::ensure_image_tag(prompt, &config.default_prompt);

    push(progress, task_id, Stage::Preprocessing, 10, "文件上传完成，正在预处理...").await;

    // ── Decompose ────────────────────────────────────────────────────────
    let pages = decompose(input, media, workspace).await?;
    if media == MediaKind::Pdf {
        push(
            progress,
            task_id,
            Stage::Preprocessing,
            20,
            &format!("PDF 已拆分为 {} 页", pages.len()),
        )
        .await;
    }

    // Mode resolution happens before any engine call so an unknown key never
    // touches the gate.
    let mode = *mode_config(mode_key).ok_or_else(|| OcrError::InvalidMode(mode_key.to_string()))?;
    let output_dir = workspace.outputs_dir()?;
    let total = pages.len();

    // ── Per-page inference ───────────────────────────────────────────────
    let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total);
    let mut text_sections: Vec<String> = Vec::with_capacity(total);
    let mut raw_sections: Vec<String> = Vec::with_capacity(total);

    for (idx, page_path) in pages.iter().enumerate() {
        push(
            progress,
            task_id,
            Stage::Inference,
            inference_percent(idx, total),
            &format!("正在识别第 {}/{} 页...", idx + 1, total),
        )
        .await;

        let page_started = Instant::now();
        let raw = gate
            .recognize(InferenceRequest {
                prompt: effective_prompt.clone(),
                image_path: page_path.clone(),
                output_dir: output_dir.clone(),
                mode,
            })
            .await?;
        let page_ms = round2(page_started.elapsed().as_secs_f64() * 1000.0);

        let text = prompts::clean_prediction(&raw);
        let page_layout = layout::extract(&raw, page_path);
        let image_data = match media {
            MediaKind::Pdf => Some(encode_data_url(page_path).await?),
            MediaKind::Image => None,
        };

        text_sections.push(text_section(idx, &text));
        raw_sections.push(raw_section(idx, &raw));
        outcomes.push(PageOutcome {
            page_index: idx,
            text,
            raw_text: raw,
            layout: Some(page_layout),
            image_data,
            duration_ms: Some(page_ms),
        });

        push(
            progress,
            task_id,
            Stage::Inference,
            inference_percent(idx + 1, total),
            &format!("第 {}/{} 页识别完成", idx + 1, total),
        )
        .await;
    }

    // ── Aggregate ────────────────────────────────────────────────────────
    push(progress, task_id, Stage::Postprocessing, 95, "正在整理结果...").await;

    let text = text_sections.join("\n\n");
    let raw_text = raw_sections.join("\n\n");
    // Top-level layout mirrors the first page only; all pages carry their
    // own inside `pages`.
    let first_layout = outcomes.first().and_then(|p| p.layout.clone());

    let duration_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
    info!(
        pages = total,
        duration_ms, mode = mode_key, "job complete for {file_name}"
    );

    push(progress, task_id, Stage::Complete, 100, "识别完成！").await;

    Ok(OcrResponse {
        mode: mode_key.to_string(),
        prompt: effective_prompt,
        text,
        raw_text,
        duration_ms,
        file_name: file_name.to_string(),
        file_size,
        layout: first_layout,
        pages: outcomes,
    })
}

async fn push(
    progress: &ProgressRegistry,
    task_id: Option<&str>,
    stage: Stage,
    current: u32,
    message: &str,
) {
    if let Some(id) = task_id {
        progress.update(id, stage, current, 100, message).await;
    }
}

/// Inference occupies the 20–90% band of the progress scale.
fn inference_percent(pages_done: usize, total: usize) -> u32 {
    if total == 0 {
        20
    } else {
        20 + (pages_done * 70 / total) as u32
    }
}

fn text_section(page_idx: usize, text: &str) -> String {
    format!("## 第 {} 页\n{}", page_idx + 1, text).trim().to_string()
}

fn raw_section(page_idx: usize, raw: &str) -> String {
    format!("[Page {}]\n{}", page_idx + 1, raw).trim().to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Base64 data URL for an on-disk page image.
async fn encode_data_url(path: &Path) -> Result<String, OcrError> {
    let mime = match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    let bytes = tokio::fs::read(path).await.map_err(|e| OcrError::Storage {
        detail: format!("{}: {e}", path.display()),
    })?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}
