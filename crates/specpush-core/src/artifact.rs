//! Writes the submitted document into the working tree.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::error::{ProvisionError, Result};

/// Serializes a specification to its compact JSON text and writes it at the
/// root of a checked-out working tree.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    file_name: String,
}

impl ArtifactWriter {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Write `content` as the entire contents of the artifact file, replacing
    /// whatever was there before. Returns the written path.
    pub fn write(&self, workspace_root: &Path, content: &Value) -> Result<PathBuf> {
        let path = workspace_root.join(&self.file_name);
        if !is_plain_file_name(&self.file_name) {
            return Err(ProvisionError::Write {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "artifact file name must be a single path component outside .git",
                ),
            });
        }

        let text = serde_json::to_string(content).map_err(|err| ProvisionError::Write {
            path: path.clone(),
            source: err.into(),
        })?;
        std::fs::write(&path, text).map_err(|source| ProvisionError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "wrote artifact");
        Ok(path)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(first)), None) if first != ".git"
    )
}
