//! Service configuration and the recognition-mode table.
//!
//! All runtime behaviour is controlled through [`ServiceConfig`], resolved
//! once at startup from environment variables (with `.env` support in the
//! binary). Keeping every knob in one struct makes it trivial to share across
//! handlers, log at startup, and override in tests.
//!
//! The mode table is a process-wide constant: the keys, engine parameters and
//! UI metadata are part of the public API (`GET /api/modes` serves the table
//! verbatim) and are never mutated at runtime.

use serde::Serialize;
use std::path::PathBuf;

/// A named bundle of resolution/cropping parameters controlling the
/// recognition engine's accuracy/speed trade-off.
///
/// `label`, `description`, `speed` and `quality` are display metadata for the
/// frontend; `base_size`, `image_size`, `crop_mode` and `test_compress` are
/// fed to the engine unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeConfig {
    pub label: &'static str,
    pub description: &'static str,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    pub test_compress: bool,
    pub speed: &'static str,
    pub quality: &'static str,
}

/// The mode key applied when a request does not name one.
pub const DEFAULT_MODE: &str = "gundam";

/// Recognition modes in presentation order. Slice rather than map so
/// `/health` and `/api/modes` preserve insertion order.
pub const MODES: &[(&str, ModeConfig)] = &[
    (
        "gundam",
        ModeConfig {
            label: "Gundam (动态裁剪)",
            description: "默认模式，使用640分辨率局部裁剪，适合复杂排版。",
            base_size: 1024,
            image_size: 640,
            crop_mode: true,
            test_compress: true,
            speed: "中等",
            quality: "更高",
        },
    ),
    (
        "base",
        ModeConfig {
            label: "Base 1024",
            description: "固定1024分辨率，不裁剪，兼顾速度和效果。",
            base_size: 1024,
            image_size: 1024,
            crop_mode: false,
            test_compress: false,
            speed: "中等",
            quality: "高",
        },
    ),
    (
        "small",
        ModeConfig {
            label: "Small 640",
            description: "固定640分辨率，不裁剪，速度较快。",
            base_size: 640,
            image_size: 640,
            crop_mode: false,
            test_compress: false,
            speed: "较快",
            quality: "中等",
        },
    ),
    (
        "tiny",
        ModeConfig {
            label: "Tiny 512",
            description: "512基础尺寸，适合快速粗略浏览。",
            base_size: 512,
            image_size: 512,
            crop_mode: false,
            test_compress: false,
            speed: "最快",
            quality: "基础",
        },
    ),
    (
        "large",
        ModeConfig {
            label: "Large 1280",
            description: "1280基础尺寸，追求极致细节，需要更久推理时间。",
            base_size: 1280,
            image_size: 1280,
            crop_mode: false,
            test_compress: false,
            speed: "最慢",
            quality: "最高",
        },
    ),
];

/// Look up a mode by key.
pub fn mode_config(key: &str) -> Option<&'static ModeConfig> {
    MODES.iter().find(|(k, _)| *k == key).map(|(_, cfg)| cfg)
}

/// Mode keys in presentation order.
pub fn mode_keys() -> Vec<&'static str> {
    MODES.iter().map(|(k, _)| *k).collect()
}

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Prompt applied when a request supplies none (or an empty one).
    pub default_prompt: String,

    /// Maximum accepted upload size in megabytes.
    pub max_image_mb: f64,

    /// CORS origins; `["*"]` means unrestricted.
    pub allowed_origins: Vec<String>,

    /// Recognition-model directory override. `None` lets the engine loader
    /// fall back to its platform default.
    pub model_dir: Option<PathBuf>,

    /// Root directory under which per-job scratch workspaces are created.
    pub runs_dir: PathBuf,

    /// Attention-implementation hint, passed opaquely to the engine loader.
    pub attn_impl: Option<String>,

    /// Network bind host.
    pub host: String,

    /// Network bind port.
    pub port: u16,

    /// Local-development hot-reload toggle. The server only records the
    /// flag; process restarts are driven by an external watcher.
    pub dev_reload: bool,
}

impl ServiceConfig {
    /// Maximum accepted upload size in bytes.
    pub fn max_image_bytes(&self) -> u64 {
        (self.max_image_mb * 1024.0 * 1024.0) as u64
    }

    /// Resolve configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key lookup.
    ///
    /// This is the seam the environment resolution is tested through, since
    /// mutating process environment inside parallel tests races.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let allowed_origins: Vec<String> = non_empty("INKSTONE_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .filter(|v: &Vec<String>| !v.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Self {
            default_prompt: non_empty("INKSTONE_DEFAULT_PROMPT")
                .unwrap_or_else(|| crate::prompts::DEFAULT_PROMPT.to_string()),
            max_image_mb: non_empty("INKSTONE_MAX_IMAGE_MB")
                .and_then(|v| v.parse().ok())
                .unwrap_or(15.0),
            allowed_origins,
            model_dir: non_empty("INKSTONE_MODEL_DIR").map(PathBuf::from),
            runs_dir: non_empty("INKSTONE_RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("inkstone-runs")),
            attn_impl: non_empty("INKSTONE_ATTN_IMPL"),
            host: non_empty("INKSTONE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: non_empty("INKSTONE_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            dev_reload: non_empty("INKSTONE_DEV_RELOAD")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_has_the_five_keys_in_order() {
        assert_eq!(mode_keys(), vec!["gundam", "base", "small", "tiny", "large"]);
    }

    #[test]
    fn gundam_is_the_only_cropping_mode() {
        for (key, cfg) in MODES {
            assert_eq!(cfg.crop_mode, *key == "gundam", "{key}");
        }
    }

    #[test]
    fn unknown_mode_is_absent() {
        assert!(mode_config("warp").is_none());
        assert!(mode_config("base").is_some());
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = ServiceConfig::from_lookup(|_| None);
        assert_eq!(cfg.max_image_mb, 15.0);
        assert_eq!(cfg.allowed_origins, vec!["*".to_string()]);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8000);
        assert!(!cfg.dev_reload);
        assert!(cfg.model_dir.is_none());
        assert_eq!(cfg.max_image_bytes(), 15 * 1024 * 1024);
    }

    #[test]
    fn environment_overrides_apply() {
        let cfg = ServiceConfig::from_lookup(|key| match key {
            "INKSTONE_MAX_IMAGE_MB" => Some("2.5".into()),
            "INKSTONE_ALLOWED_ORIGINS" => Some("https://a.example, https://b.example".into()),
            "INKSTONE_PORT" => Some("9100".into()),
            "INKSTONE_DEV_RELOAD" => Some("1".into()),
            "INKSTONE_MODEL_DIR" => Some("/models/ocr".into()),
            _ => None,
        });
        assert_eq!(cfg.max_image_mb, 2.5);
        assert_eq!(
            cfg.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(cfg.port, 9100);
        assert!(cfg.dev_reload);
        assert_eq!(cfg.model_dir.as_deref(), Some(std::path::Path::new("/models/ocr")));
    }

    #[test]
    fn blank_origin_list_falls_back_to_wildcard() {
        let cfg = ServiceConfig::from_lookup(|key| match key {
            "INKSTONE_ALLOWED_ORIGINS" => Some(" , ,".into()),
            _ => None,
        });
        assert_eq!(cfg.allowed_origins, vec!["*".to_string()]);
    }
}
