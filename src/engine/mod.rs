//! The recognition engine boundary: loading, readiness, and the inference gate.
//!
//! The model itself is opaque to this crate. Two narrow traits cover the
//! whole surface: [`EngineLoader`] performs the one-time blocking load and
//! [`RecognitionEngine`] runs one page. Everything model-specific (weights,
//! tokenisation, devices) lives behind them.
//!
//! ## Single load, single flight
//!
//! The loaded engine is process-global state with a single-initialisation
//! lifecycle. [`EngineHandle`] makes that explicit: a write-once slot filled
//! by a startup task and read lock-free afterwards. Requests arriving before
//! the slot is filled observe [`OcrError::ModelNotReady`] instead of queueing
//! behind the load.
//!
//! [`InferenceGate`] serialises the actual compute: at most one page's
//! inference call executes at any instant, process-wide. The tokio mutex
//! grants the lock to waiters in arrival order, so jobs queue FIFO with no
//! priority or preemption, and there are no retries — failures propagate.

use crate::config::ModeConfig;
use crate::error::OcrError;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[cfg(feature = "ocr-ocrs")]
pub mod ocrs_backend;

/// Everything one page inference needs.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Effective prompt, `<image>` placeholder included.
    pub prompt: String,
    /// Page image to recognise.
    pub image_path: PathBuf,
    /// Per-job directory the engine may write auxiliary output into.
    pub output_dir: PathBuf,
    /// Resolution/cropping parameters for this call.
    pub mode: ModeConfig,
}

/// A loaded recognition engine. Calls are blocking and must be driven from
/// `spawn_blocking`; the gate takes care of that.
pub trait RecognitionEngine: Send + Sync {
    /// Recognise one page. `Ok(None)` means the engine produced no output.
    fn infer(&self, request: &InferenceRequest) -> Result<Option<String>, OcrError>;
}

/// One-time blocking engine loader.
pub trait EngineLoader: Send + Sync {
    /// Load weights and return the ready engine. Fails when model files are
    /// absent or the backing runtime is unusable.
    fn load(&self) -> Result<Arc<dyn RecognitionEngine>, OcrError>;
}

/// Write-once slot holding the loaded engine.
#[derive(Default)]
pub struct EngineHandle {
    slot: OnceCell<Arc<dyn RecognitionEngine>>,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the loader on the blocking pool and fill the slot.
    ///
    /// A second call is a no-op for the slot (first load wins) but still
    /// reports the loader's error if it failed.
    pub async fn initialize(&self, loader: Arc<dyn EngineLoader>) -> Result<(), OcrError> {
        let engine = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| OcrError::Internal(format!("engine load task panicked: {e}")))??;
        let _ = self.slot.set(engine);
        info!("recognition engine is ready");
        Ok(())
    }

    /// Install an already-loaded engine. Used by tests and embedders that
    /// construct the engine themselves.
    pub fn install(&self, engine: Arc<dyn RecognitionEngine>) {
        let _ = self.slot.set(engine);
    }

    /// The engine, if the one-time load has completed.
    pub fn get(&self) -> Option<Arc<dyn RecognitionEngine>> {
        self.slot.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// FIFO gate serialising access to the shared engine.
pub struct InferenceGate {
    handle: Arc<EngineHandle>,
    lock: Mutex<()>,
}

impl InferenceGate {
    pub fn new(handle: Arc<EngineHandle>) -> Self {
        Self {
            handle,
            lock: Mutex::new(()),
        }
    }

    /// Run one page through the engine, holding the gate for the duration of
    /// the call.
    ///
    /// Readiness is checked before queueing so requests arriving while the
    /// model is still loading fail fast with [`OcrError::ModelNotReady`].
    pub async fn recognize(&self, request: InferenceRequest) -> Result<String, OcrError> {
        let engine = self.handle.get().ok_or(OcrError::ModelNotReady)?;

        let _held = self.lock.lock().await;
        let raw = tokio::task::spawn_blocking(move || engine.infer(&request))
            .await
            .map_err(|e| OcrError::Internal(format!("inference task panicked: {e}")))??;
        raw.ok_or_else(OcrError::empty_inference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::mode_config;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock engine that flags overlapping invocations.
    struct OverlapDetector {
        in_flight: AtomicBool,
        overlapped: AtomicBool,
        calls: AtomicUsize,
    }

    impl OverlapDetector {
        fn new() -> Self {
            Self {
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RecognitionEngine for OverlapDetector {
        fn infer(&self, _request: &InferenceRequest) -> Result<Option<String>, OcrError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(25));
            self.in_flight.store(false, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("raw".to_string()))
        }
    }

    fn request() -> InferenceRequest {
        InferenceRequest {
            prompt: "<image>\nocr".into(),
            image_path: PathBuf::from("/tmp/page.png"),
            output_dir: PathBuf::from("/tmp/out"),
            mode: *mode_config("base").unwrap(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_never_overlap() {
        let detector = Arc::new(OverlapDetector::new());
        let handle = Arc::new(EngineHandle::new());
        handle.install(detector.clone());
        let gate = Arc::new(InferenceGate::new(handle));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move { gate.recognize(request()).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "raw");
        }

        assert_eq!(detector.calls.load(Ordering::SeqCst), 4);
        assert!(
            !detector.overlapped.load(Ordering::SeqCst),
            "two inference calls ran concurrently"
        );
    }

    #[tokio::test]
    async fn unloaded_handle_reports_model_not_ready() {
        let gate = InferenceGate::new(Arc::new(EngineHandle::new()));
        let err = gate.recognize(request()).await.unwrap_err();
        assert!(matches!(err, OcrError::ModelNotReady));
    }

    #[tokio::test]
    async fn empty_engine_output_is_an_inference_failure() {
        struct Silent;
        impl RecognitionEngine for Silent {
            fn infer(&self, _r: &InferenceRequest) -> Result<Option<String>, OcrError> {
                Ok(None)
            }
        }
        let handle = Arc::new(EngineHandle::new());
        handle.install(Arc::new(Silent));
        let gate = InferenceGate::new(handle);
        let err = gate.recognize(request()).await.unwrap_err();
        assert!(matches!(err, OcrError::Inference { .. }));
    }

    #[tokio::test]
    async fn initialize_fills_the_slot_once() {
        struct FixedLoader(Arc<dyn RecognitionEngine>);
        impl EngineLoader for FixedLoader {
            fn load(&self) -> Result<Arc<dyn RecognitionEngine>, OcrError> {
                Ok(Arc::clone(&self.0))
            }
        }
        struct A;
        impl RecognitionEngine for A {
            fn infer(&self, _r: &InferenceRequest) -> Result<Option<String>, OcrError> {
                Ok(Some("a".into()))
            }
        }

        let handle = EngineHandle::new();
        assert!(!handle.is_loaded());
        handle
            .initialize(Arc::new(FixedLoader(Arc::new(A))))
            .await
            .unwrap();
        assert!(handle.is_loaded());
    }
}
