//! Document decomposition: one document in, an ordered page-image sequence out.
//!
//! Single images pass through untouched (no copy). PDFs are rasterised page
//! by page through pdfium at a fixed 2× scale into `pages/page_<n>.png`.
//!
//! ## Why spawn_blocking?
//!
//! pdfium wraps a C++ library with thread-local state that must not run on
//! async worker threads. `tokio::task::spawn_blocking` moves the rasterise
//! loop onto the blocking pool, leaving the runtime free while a large
//! document renders.

use crate::error::OcrError;
use crate::pipeline::intake::MediaKind;
use crate::workspace::ScratchWorkspace;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed rasterisation magnification for PDF pages.
const PAGE_SCALE: f32 = 2.0;

/// Decompose the stored upload into page images, in source page order.
///
/// Filenames are 1-indexed (`page_1.png` is index 0 of the returned
/// sequence); the sequence itself is strictly source-ordered.
pub async fn decompose(
    input: &Path,
    media: MediaKind,
    workspace: &ScratchWorkspace,
) -> Result<Vec<PathBuf>, OcrError> {
    match media {
        MediaKind::Image => Ok(vec![input.to_path_buf()]),
        MediaKind::Pdf => {
            let pages_dir = workspace.pages_dir()?;
            let input = input.to_path_buf();
            tokio::task::spawn_blocking(move || rasterize_pages(&input, &pages_dir))
                .await
                .map_err(|e| OcrError::Internal(format!("rasterise task panicked: {e}")))?
        }
    }
}

/// Blocking rasterise loop: every page at [`PAGE_SCALE`], PNG output.
fn rasterize_pages(pdf_path: &Path, pages_dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| OcrError::Decomposition {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    if page_count == 0 {
        return Err(OcrError::Decomposition {
            detail: "document has zero pages".to_string(),
        });
    }
    debug!("document loaded: {page_count} pages");

    let render_config = PdfRenderConfig::new().scale_page_by_factor(PAGE_SCALE);

    let mut paths = Vec::with_capacity(page_count);
    for index in 0..page_count {
        let page = pages
            .get(index as u16)
            .map_err(|e| OcrError::Decomposition {
                detail: format!("page {}: {e:?}", index + 1),
            })?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| OcrError::Decomposition {
                detail: format!("page {}: {e:?}", index + 1),
            })?;
        let image = bitmap.as_image();

        let path = pages_dir.join(format!("page_{}.png", index + 1));
        image.save(&path).map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", path.display()),
        })?;
        debug!(
            "rasterised page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        paths.push(path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, ScratchWorkspace) {
        let root = tempfile::tempdir().unwrap();
        let ws = ScratchWorkspace::create(root.path()).unwrap();
        (root, ws)
    }

    #[tokio::test]
    async fn single_image_passes_through_without_copy() {
        let (_root, ws) = workspace();
        let input = ws.path().join("input.png");
        std::fs::write(&input, b"not really a png").unwrap();

        let pages = decompose(&input, MediaKind::Image, &ws).await.unwrap();
        assert_eq!(pages, vec![input]);
        assert!(!ws.path().join("pages").exists(), "no pages dir for images");
    }

    // Rasterisation needs a pdfium library at runtime; those paths are
    // covered by the env-gated end-to-end tests.
}
