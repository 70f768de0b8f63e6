//! Upload intake: media-type classification and bounded streaming to disk.
//!
//! The upload is written in whatever chunks the transport delivers, never
//! buffered whole in memory, and the running total is checked before each
//! chunk is persisted — so the byte that crosses the configured limit is
//! never written. Dropping an unfinished [`UploadSink`] removes the scratch
//! workspace it allocated.

use crate::config::ServiceConfig;
use crate::error::OcrError;
use crate::workspace::ScratchWorkspace;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// What kind of document the caller declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A single raster image; passes through decomposition untouched.
    Image,
    /// A multi-page document to be rasterised page by page.
    Pdf,
}

/// Classify an upload from its declared filename and content type.
///
/// A `.pdf` suffix or `application/pdf` content type wins over an image
/// content type, matching how browsers label PDF form files.
pub fn classify_media(
    file_name: Option<&str>,
    content_type: Option<&str>,
) -> Result<(String, MediaKind), OcrError> {
    let name = file_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| OcrError::Validation("请选择需要识别的图片。".to_string()))?;

    let suffix = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let content_type = content_type.unwrap_or_default();

    if suffix == "pdf" || content_type == "application/pdf" {
        return Ok((name.to_string(), MediaKind::Pdf));
    }
    if content_type.starts_with("image/") {
        return Ok((name.to_string(), MediaKind::Image));
    }
    Err(OcrError::UnsupportedMediaType)
}

/// A durable upload inside its scratch workspace.
#[derive(Debug)]
pub struct StoredUpload {
    pub workspace: ScratchWorkspace,
    pub path: PathBuf,
    pub size: u64,
    pub file_name: String,
    pub media: MediaKind,
}

/// Streaming writer for one upload.
///
/// Allocates the job's [`ScratchWorkspace`] on creation; the caller feeds
/// chunks with [`UploadSink::push_chunk`] and finalises with
/// [`UploadSink::finish`].
pub struct UploadSink {
    workspace: ScratchWorkspace,
    file: File,
    path: PathBuf,
    file_name: String,
    media: MediaKind,
    limit: u64,
    limit_mb: f64,
    written: u64,
}

impl UploadSink {
    /// Allocate a workspace and open the input file for writing.
    pub async fn create(
        config: &ServiceConfig,
        file_name: String,
        media: MediaKind,
    ) -> Result<Self, OcrError> {
        let workspace = ScratchWorkspace::create(&config.runs_dir)?;

        let suffix = Path::new(&file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_else(|| ".png".to_string());
        let path = workspace.path().join(format!("input{suffix}"));

        let file = File::create(&path).await.map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", path.display()),
        })?;

        Ok(Self {
            workspace,
            file,
            path,
            file_name,
            media,
            limit: config.max_image_bytes(),
            limit_mb: config.max_image_mb,
            written: 0,
        })
    }

    /// Append one chunk, aborting before the limit-crossing byte is written.
    pub async fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), OcrError> {
        let next = self.written + chunk.len() as u64;
        if next > self.limit {
            return Err(OcrError::SizeLimitExceeded {
                limit_mb: self.limit_mb,
            });
        }
        self.file.write_all(chunk).await.map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", self.path.display()),
        })?;
        self.written = next;
        Ok(())
    }

    /// Flush and return the durable upload.
    pub async fn finish(mut self) -> Result<StoredUpload, OcrError> {
        self.file.flush().await.map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", self.path.display()),
        })?;
        debug!(
            "stored upload {} ({} bytes) at {}",
            self.file_name,
            self.written,
            self.path.display()
        );
        Ok(StoredUpload {
            workspace: self.workspace,
            path: self.path,
            size: self.written,
            file_name: self.file_name,
            media: self.media,
        })
    }

    /// Path of the partially written input file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Path of the workspace this sink allocated.
    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(root: &Path, max_mb: f64) -> ServiceConfig {
        ServiceConfig {
            runs_dir: root.to_path_buf(),
            max_image_mb: max_mb,
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn classify_requires_a_filename() {
        assert!(matches!(
            classify_media(None, Some("image/png")),
            Err(OcrError::Validation(_))
        ));
        assert!(matches!(
            classify_media(Some(""), Some("image/png")),
            Err(OcrError::Validation(_))
        ));
    }

    #[test]
    fn classify_detects_pdf_by_suffix_or_content_type() {
        let (_, kind) = classify_media(Some("doc.PDF"), Some("application/octet-stream")).unwrap();
        assert_eq!(kind, MediaKind::Pdf);
        let (_, kind) = classify_media(Some("doc.bin"), Some("application/pdf")).unwrap();
        assert_eq!(kind, MediaKind::Pdf);
    }

    #[test]
    fn classify_accepts_images_and_rejects_the_rest() {
        let (name, kind) = classify_media(Some("scan.jpeg"), Some("image/jpeg")).unwrap();
        assert_eq!(name, "scan.jpeg");
        assert_eq!(kind, MediaKind::Image);
        assert!(matches!(
            classify_media(Some("notes.txt"), Some("text/plain")),
            Err(OcrError::UnsupportedMediaType)
        ));
    }

    #[tokio::test]
    async fn sink_stores_chunks_and_reports_size() {
        let root = tempfile::tempdir().unwrap();
        let config = config_with(root.path(), 1.0);
        let mut sink = UploadSink::create(&config, "scan.png".into(), MediaKind::Image)
            .await
            .unwrap();
        sink.push_chunk(b"hello ").await.unwrap();
        sink.push_chunk(b"world").await.unwrap();
        let stored = sink.finish().await.unwrap();
        assert_eq!(stored.size, 11);
        assert!(stored.path.ends_with("input.png"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn sink_defaults_extension_to_png() {
        let root = tempfile::tempdir().unwrap();
        let config = config_with(root.path(), 1.0);
        let sink = UploadSink::create(&config, "upload".into(), MediaKind::Image)
            .await
            .unwrap();
        assert!(sink.file_path().ends_with("input.png"));
    }

    #[tokio::test]
    async fn limit_crossing_chunk_is_never_persisted() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_with(root.path(), 1.0);
        // 10-byte limit
        config.max_image_mb = 10.0 / (1024.0 * 1024.0);
        let mut sink = UploadSink::create(&config, "scan.png".into(), MediaKind::Image)
            .await
            .unwrap();
        sink.push_chunk(b"12345678").await.unwrap();
        let err = sink.push_chunk(b"90123456").await.unwrap_err();
        assert!(matches!(err, OcrError::SizeLimitExceeded { .. }));
        // Only the first chunk reached disk.
        assert_eq!(std::fs::metadata(sink.file_path()).unwrap().len(), 8);

        let workspace = sink.workspace_path().to_path_buf();
        drop(sink);
        assert!(!workspace.exists(), "aborted upload must remove its workspace");
    }

    #[tokio::test]
    async fn oversize_error_carries_the_configured_limit() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_with(root.path(), 1.0);
        config.max_image_mb = 0.0;
        let mut sink = UploadSink::create(&config, "scan.png".into(), MediaKind::Image)
            .await
            .unwrap();
        match sink.push_chunk(b"x").await.unwrap_err() {
            OcrError::SizeLimitExceeded { limit_mb } => assert_eq!(limit_mb, 0.0),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
