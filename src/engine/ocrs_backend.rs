//! OCRS recognition backend (pure Rust, CPU).
//!
//! Loads the ocrs text-detection and text-recognition models from disk and
//! runs them through the rten runtime. The mode's base size bounds the input
//! resolution: larger pages are downscaled before detection, which is where
//! the mode table's accuracy/speed trade-off lands on this backend. The
//! prompt and cropping/compression flags have no equivalent here and are
//! accepted unchanged.

use crate::engine::{EngineLoader, InferenceRequest, RecognitionEngine};
use crate::error::OcrError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const DETECTION_FILE: &str = "text-detection.rten";
const RECOGNITION_FILE: &str = "text-recognition.rten";

/// Loader for the ocrs model pair.
pub struct OcrsLoader {
    /// Model directory override; platform cache dir when unset.
    pub model_dir: Option<PathBuf>,
    /// Attention-implementation hint. Opaque to this backend; recorded in
    /// the load log only.
    pub attn_impl: Option<String>,
}

impl OcrsLoader {
    pub fn new(model_dir: Option<PathBuf>, attn_impl: Option<String>) -> Self {
        Self {
            model_dir,
            attn_impl,
        }
    }

    fn resolve_model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("inkstone-ocr")
                .join("models")
        })
    }
}

impl EngineLoader for OcrsLoader {
    fn load(&self) -> Result<Arc<dyn RecognitionEngine>, OcrError> {
        let model_dir = self.resolve_model_dir();
        let detection_path = model_dir.join(DETECTION_FILE);
        let recognition_path = model_dir.join(RECOGNITION_FILE);

        for path in [&detection_path, &recognition_path] {
            if !path.is_file() {
                return Err(OcrError::EngineLoad {
                    detail: format!("model file missing: {}", path.display()),
                });
            }
        }

        info!(
            "loading recognition models from {} (attn hint: {:?})",
            model_dir.display(),
            self.attn_impl
        );

        let detection_model =
            rten::Model::load_file(&detection_path).map_err(|e| OcrError::EngineLoad {
                detail: format!("detection model: {e}"),
            })?;
        let recognition_model =
            rten::Model::load_file(&recognition_path).map_err(|e| OcrError::EngineLoad {
                detail: format!("recognition model: {e}"),
            })?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| OcrError::EngineLoad {
            detail: format!("engine construction: {e}"),
        })?;

        Ok(Arc::new(OcrsEngine { engine }))
    }
}

/// The loaded ocrs engine pair behind the [`RecognitionEngine`] interface.
pub struct OcrsEngine {
    engine: ocrs::OcrEngine,
}

impl RecognitionEngine for OcrsEngine {
    fn infer(&self, request: &InferenceRequest) -> Result<Option<String>, OcrError> {
        let img = image::open(&request.image_path).map_err(|e| OcrError::Inference {
            detail: format!("{}: {e}", request.image_path.display()),
        })?;

        // Bound the input to the mode's base resolution; aspect is preserved.
        let base = request.mode.base_size;
        let img = if img.width().max(img.height()) > base {
            debug!(
                "downscaling {}x{} page to fit {base} px",
                img.width(),
                img.height()
            );
            img.resize(base, base, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|e| {
            OcrError::Inference {
                detail: format!("image conversion: {e}"),
            }
        })?;

        let input = self.engine.prepare_input(source).map_err(|e| OcrError::Inference {
            detail: format!("input preparation: {e}"),
        })?;
        let text = self.engine.get_text(&input).map_err(|e| OcrError::Inference {
            detail: format!("recognition: {e}"),
        })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fails_without_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let loader = OcrsLoader::new(Some(dir.path().to_path_buf()), None);
        let err = match loader.load() {
            Ok(_) => panic!("expected load to fail without model files"),
            Err(e) => e,
        };
        match err {
            OcrError::EngineLoad { detail } => assert!(detail.contains(DETECTION_FILE)),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn model_dir_override_is_respected() {
        let loader = OcrsLoader::new(Some(PathBuf::from("/models/here")), None);
        assert_eq!(loader.resolve_model_dir(), PathBuf::from("/models/here"));
    }
}
