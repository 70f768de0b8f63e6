//! HTTP server: shared state, error mapping, and the serve loop.
//!
//! The state is cheap to clone (everything behind `Arc`) and carries the four
//! long-lived pieces every handler needs: configuration, the engine handle,
//! the inference gate, and the progress registry.

mod handlers;
mod routes;

pub use routes::create_router;

use crate::config::ServiceConfig;
use crate::engine::{EngineHandle, InferenceGate};
use crate::error::OcrError;
use crate::progress::ProgressRegistry;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub engine: Arc<EngineHandle>,
    pub gate: Arc<InferenceGate>,
    pub progress: Arc<ProgressRegistry>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        let engine = Arc::new(EngineHandle::new());
        let gate = Arc::new(InferenceGate::new(Arc::clone(&engine)));
        Self {
            config: Arc::new(config),
            engine,
            gate,
            progress: Arc::new(ProgressRegistry::new()),
        }
    }
}

/// Pipeline error as an HTTP response: `{"detail": "<message>"}` with the
/// taxonomy's status code.
pub struct ApiError(pub OcrError);

impl From<OcrError> for ApiError {
    fn from(err: OcrError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("request failed: {:?}", self.0);
        } else {
            warn!("request rejected: {}", self.0);
        }
        let body = Json(serde_json::json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Start the web server and run until the process is stopped.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<(), OcrError> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| OcrError::Internal(format!("invalid bind address {host}:{port}: {e}")))?;

    state.progress.spawn_reaper();
    if state.config.dev_reload {
        info!("dev reload flag set; process restarts are left to the external watcher");
    }

    let app = create_router(state);
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| OcrError::Internal(format!("bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| OcrError::Internal(format!("server: {e}")))
}
