//! Per-job scratch workspaces.
//!
//! Every job owns exactly one uniquely named directory under the configured
//! runs root, holding the uploaded input, decomposed page images and the
//! engine output directory. The directory is deleted exactly once when the
//! job's processing path exits — success or failure — and deletion failures
//! are logged, never escalated, since the response is already determined by
//! then.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A uniquely named scratch directory tree owned by one job.
///
/// Explicit [`ScratchWorkspace::cleanup`] is the normal exit; dropping the
/// value removes the directory too, which covers panics.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Allocate a fresh workspace under `runs_root`, creating the root if
    /// needed.
    pub fn create(runs_root: &Path) -> Result<Self, OcrError> {
        std::fs::create_dir_all(runs_root).map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", runs_root.display()),
        })?;
        let dir = tempfile::Builder::new()
            .prefix("inkstone_ocr_")
            .tempdir_in(runs_root)
            .map_err(|e| OcrError::Storage {
                detail: format!("{}: {e}", runs_root.display()),
            })?;
        debug!("allocated scratch workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory for decomposed page images; created on first use.
    pub fn pages_dir(&self) -> Result<PathBuf, OcrError> {
        let dir = self.dir.path().join("pages");
        std::fs::create_dir_all(&dir).map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", dir.display()),
        })?;
        Ok(dir)
    }

    /// Directory handed to the engine for auxiliary output; created on
    /// first use.
    pub fn outputs_dir(&self) -> Result<PathBuf, OcrError> {
        let dir = self.dir.path().join("outputs");
        std::fs::create_dir_all(&dir).map_err(|e| OcrError::Storage {
            detail: format!("{}: {e}", dir.display()),
        })?;
        Ok(dir)
    }

    /// Delete the workspace. Best-effort: failures are logged and swallowed.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("removed scratch workspace {}", path.display()),
            Err(e) => warn!("failed to remove scratch workspace {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_cleanup_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = ScratchWorkspace::create(root.path()).unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.is_dir());
        std::fs::write(path.join("input.png"), b"x").unwrap();
        ws.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = ScratchWorkspace::create(root.path()).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn nested_dirs_are_created_under_the_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = ScratchWorkspace::create(root.path()).unwrap();
        let pages = ws.pages_dir().unwrap();
        let outputs = ws.outputs_dir().unwrap();
        assert!(pages.starts_with(ws.path()));
        assert!(outputs.is_dir());
    }

    #[test]
    fn workspaces_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchWorkspace::create(root.path()).unwrap();
        let b = ScratchWorkspace::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
