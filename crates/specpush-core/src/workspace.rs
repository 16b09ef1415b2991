//! Ephemeral clone targets.
//!
//! A [`TempWorkspace`] owns one uniquely-named directory for the length of a
//! provisioning run. The directory is removed when the workspace is released
//! or, failing that, when it is dropped (early return, `?`, or unwinding).

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ProvisionError, Result};

#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    /// Allocate an empty directory named `<prefix><random>` under the system
    /// temp directory.
    pub fn acquire(prefix: &str) -> Result<Self> {
        Self::acquire_in(&std::env::temp_dir(), prefix)
    }

    /// Allocate an empty directory named `<prefix><random>` under `base`,
    /// creating `base` if needed.
    pub fn acquire_in(base: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(base).map_err(ProvisionError::Workspace)?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(base)
            .map_err(ProvisionError::Workspace)?;
        tracing::debug!(path = %dir.path().display(), "acquired workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Recursively remove the workspace.
    ///
    /// Consumes the workspace so removal happens at most once. A removal
    /// failure is logged and otherwise ignored: the run outcome is already
    /// decided by the time the workspace is released.
    pub fn release(self) {
        let path: PathBuf = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "released workspace"),
            Err(err) => tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to remove workspace"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_empty_prefixed_dir() {
        let base = TempDir::new().unwrap();
        let ws = TempWorkspace::acquire_in(base.path(), "tempRepo").unwrap();

        assert!(ws.path().is_dir());
        assert!(std::fs::read_dir(ws.path()).unwrap().next().is_none());
        let name = ws.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("tempRepo"), "unexpected name {name}");
    }

    #[test]
    fn two_workspaces_never_share_a_path() {
        let base = TempDir::new().unwrap();
        let a = TempWorkspace::acquire_in(base.path(), "dev").unwrap();
        let b = TempWorkspace::acquire_in(base.path(), "dev").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn release_removes_nested_content() {
        let base = TempDir::new().unwrap();
        let ws = TempWorkspace::acquire_in(base.path(), "tempRepo").unwrap();
        let path = ws.path().to_path_buf();
        std::fs::create_dir_all(path.join(".git/objects")).unwrap();
        std::fs::write(path.join(".git/objects/blob"), b"x").unwrap();
        std::fs::write(path.join("openapi-spec.json"), b"{}").unwrap();

        ws.release();

        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_workspace_on_early_exit() {
        let base = TempDir::new().unwrap();
        let path = {
            let ws = TempWorkspace::acquire_in(base.path(), "tempRepo").unwrap();
            std::fs::write(ws.path().join("file"), b"x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn release_tolerates_already_removed_dir() {
        let base = TempDir::new().unwrap();
        let ws = TempWorkspace::acquire_in(base.path(), "tempRepo").unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        ws.release();
    }
}
