//! Error taxonomy for provisioning runs.
//!
//! Every variant is terminal for the run that produced it; nothing here is
//! retried. URLs carried by these errors are already redacted.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to allocate workspace")]
    Workspace(#[source] std::io::Error),

    #[error("failed to list branches of {url}")]
    RemoteQuery {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to clone {url}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to check out branch '{branch}'")]
    Branch {
        branch: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to register push remote '{remote}'")]
    Config {
        remote: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to commit {file}")]
    Commit {
        file: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to push to remote '{remote}'")]
    Push {
        remote: String,
        #[source]
        source: git2::Error,
    },

    #[error("invalid committer identity")]
    Identity(#[source] git2::Error),
}

impl ProvisionError {
    /// Short name of the workflow step that failed, used as a log field.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "workspace",
            Self::RemoteQuery { .. } => "remote-query",
            Self::Clone { .. } => "clone",
            Self::Branch { .. } => "branch",
            Self::Config { .. } => "config",
            Self::Write { .. } => "write",
            Self::Commit { .. } | Self::Identity(_) => "commit",
            Self::Push { .. } => "push",
        }
    }

    /// Message of the underlying error, for log fields.
    pub fn cause(&self) -> String {
        std::error::Error::source(self)
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
