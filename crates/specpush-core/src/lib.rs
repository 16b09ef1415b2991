//! specpush Core Library
//!
//! Publishes specification documents into a remote git repository: each
//! request clones the repository into a throwaway workspace, switches to a
//! generated or fixed branch, writes the document, commits and pushes.

pub mod artifact;
pub mod config;
pub mod credentials;
pub mod error;
pub mod provision;
pub mod remote_url;
pub mod repository;
pub mod strategy;
pub mod workspace;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::artifact::ArtifactWriter;
    pub use crate::config::{GenerateMode, ProvisionerConfig};
    pub use crate::credentials::CredentialStore;
    pub use crate::error::ProvisionError;
    pub use crate::provision::{Outcome, ProvisionReport, Provisioner};
    pub use crate::repository::{CommitIdentity, GitClient, RepositoryClient};
    pub use crate::strategy::{BranchPlan, BranchStrategy};
    pub use crate::workspace::TempWorkspace;
}
