//! Server binary for inkstone-ocr.
//!
//! A thin shim over the library crate: resolves configuration from the
//! environment (with CLI overrides), starts the one-time engine load in the
//! background, and runs the HTTP server. Requests arriving while the model
//! is still loading are answered with the model-not-ready error rather than
//! queueing behind the load.

use anyhow::Result;
use clap::Parser;
use inkstone_ocr::config::ServiceConfig;
use inkstone_ocr::server::{serve, AppState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "inkstone",
    version,
    about = "HTTP OCR service for document images and PDFs"
)]
struct Args {
    /// Bind host.
    #[arg(long, env = "INKSTONE_HOST")]
    host: Option<String>,

    /// Bind port.
    #[arg(long, env = "INKSTONE_PORT")]
    port: Option<u16>,

    /// Recognition-model directory.
    #[arg(long, env = "INKSTONE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Root directory for per-job scratch workspaces.
    #[arg(long, env = "INKSTONE_RUNS_DIR")]
    runs_dir: Option<PathBuf>,

    /// Maximum upload size in megabytes.
    #[arg(long, env = "INKSTONE_MAX_IMAGE_MB")]
    max_image_mb: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before anything reads the environment).
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkstone_ocr=info,inkstone=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = ServiceConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(model_dir) = args.model_dir {
        config.model_dir = Some(model_dir);
    }
    if let Some(runs_dir) = args.runs_dir {
        config.runs_dir = runs_dir;
    }
    if let Some(max_image_mb) = args.max_image_mb {
        config.max_image_mb = max_image_mb;
    }

    let state = AppState::new(config.clone());
    spawn_engine_load(&state, &config);

    serve(state, &config.host, config.port).await?;
    Ok(())
}

#[cfg(feature = "ocr-ocrs")]
fn spawn_engine_load(state: &AppState, config: &ServiceConfig) {
    use inkstone_ocr::engine::ocrs_backend::OcrsLoader;
    use inkstone_ocr::engine::EngineLoader;
    use std::sync::Arc;

    let loader: Arc<dyn EngineLoader> = Arc::new(OcrsLoader::new(
        config.model_dir.clone(),
        config.attn_impl.clone(),
    ));
    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        if let Err(e) = engine.initialize(loader).await {
            tracing::error!("recognition engine failed to load: {e}");
        }
    });
}

#[cfg(not(feature = "ocr-ocrs"))]
fn spawn_engine_load(_state: &AppState, _config: &ServiceConfig) {
    tracing::warn!(
        "built without a recognition backend; OCR requests will fail until an engine is installed"
    );
}
