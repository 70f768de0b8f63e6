//! Request handlers for the OCR API.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Instant;

use super::{ApiError, AppState};
use crate::config::{mode_keys, DEFAULT_MODE, MODES};
use crate::error::OcrError;
use crate::job::{self, JobRequest};
use crate::output::{HealthResponse, OcrResponse, TaskCreated};
use crate::pipeline::intake::{self, StoredUpload, UploadSink};
use crate::progress::{ProgressEvent, ProgressRecord};

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_loaded: state.engine.is_loaded(),
        modes: mode_keys(),
    })
}

/// `GET /api/modes`
pub async fn list_modes(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut modes = serde_json::Map::new();
    for (key, cfg) in MODES {
        modes.insert(
            (*key).to_string(),
            serde_json::to_value(cfg).unwrap_or_default(),
        );
    }
    Json(serde_json::json!({
        "defaultPrompt": state.config.default_prompt,
        "modes": modes,
        "maxImageMb": state.config.max_image_mb,
    }))
}

/// `POST /api/task/create`
pub async fn create_task(State(state): State<AppState>) -> Json<TaskCreated> {
    let task_id = uuid::Uuid::new_v4().to_string();
    state.progress.create_pending(&task_id).await;
    Json(TaskCreated { task_id })
}

/// `POST /api/ocr` — multipart form with `image`, and optional `mode`,
/// `prompt` and `task_id` fields.
pub async fn run_ocr(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let mut upload: Option<StoredUpload> = None;
    let mut mode = String::new();
    let mut prompt = String::new();
    let mut task_id: Option<String> = None;
    let mut validated_at: Option<Instant> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let (file_name, media) =
                    intake::classify_media(file_name.as_deref(), content_type.as_deref())?;
                validated_at = Some(Instant::now());

                let mut sink = UploadSink::create(&state.config, file_name, media).await?;
                while let Some(chunk) = field.chunk().await.map_err(bad_form)? {
                    sink.push_chunk(&chunk).await?;
                }
                upload = Some(sink.finish().await?);
            }
            "mode" => mode = field.text().await.map_err(bad_form)?,
            "prompt" => prompt = field.text().await.map_err(bad_form)?,
            "task_id" => {
                let value = field.text().await.map_err(bad_form)?;
                if !value.trim().is_empty() {
                    task_id = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let upload =
        upload.ok_or_else(|| OcrError::Validation("请选择需要识别的图片。".to_string()))?;
    let mode_key = if mode.trim().is_empty() {
        DEFAULT_MODE.to_string()
    } else {
        mode.trim().to_string()
    };

    let response = job::run(
        &state.config,
        &state.gate,
        &state.progress,
        JobRequest {
            upload,
            mode_key,
            prompt,
            task_id,
            started: validated_at.unwrap_or_else(Instant::now),
        },
    )
    .await?;

    Ok(Json(response))
}

/// `GET /api/progress/{task_id}` — SSE stream of progress snapshots,
/// terminated by a `complete` or `timeout` event.
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state
        .progress
        .clone()
        .watch(task_id)
        .map(|event| Ok::<Event, Infallible>(to_sse_event(event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: ProgressEvent) -> Event {
    match event {
        ProgressEvent::Snapshot(record) => Event::default().data(encode_record(&record)),
        ProgressEvent::Complete(record) => {
            Event::default().event("complete").data(encode_record(&record))
        }
        ProgressEvent::Timeout => Event::default()
            .event("timeout")
            .data(r#"{"message":"连接超时"}"#),
    }
}

fn encode_record(record: &ProgressRecord) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
}

fn bad_form(err: MultipartError) -> OcrError {
    OcrError::Validation(format!("上传表单解析失败: {err}"))
}
