//! Branch selection for a provisioning run.

use rand::Rng;

use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::repository::RepositoryClient;

/// Characters a generated branch suffix is drawn from.
pub const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a generated branch suffix.
pub const SUFFIX_LEN: usize = 4;

/// How a run picks the branch it publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchStrategy {
    /// A fresh `<prefix><suffix>` branch per run, created from the remote's
    /// default branch without checking whether the name is taken.
    Generated { prefix: String },
    /// A long-lived branch, reused when the remote has it and created from the
    /// default branch otherwise.
    Fixed { name: String },
}

/// Clone and checkout parameters decided for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    /// Branch the run commits to and pushes.
    pub branch: String,
    /// Branch to check out during clone; `None` for the remote default.
    pub clone_branch: Option<String>,
    /// Whether `branch` has to be created after cloning.
    pub create: bool,
}

impl BranchStrategy {
    pub fn generated(prefix: impl Into<String>) -> Self {
        Self::Generated {
            prefix: prefix.into(),
        }
    }

    pub fn fixed(name: impl Into<String>) -> Self {
        Self::Fixed { name: name.into() }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generated { .. } => "generated",
            Self::Fixed { .. } => "fixed",
        }
    }

    /// Decide clone and checkout parameters, querying the remote only for the
    /// fixed flavor.
    pub fn plan<C: RepositoryClient>(
        &self,
        client: &C,
        url: &str,
        credentials: &CredentialStore,
    ) -> Result<BranchPlan> {
        self.plan_with_rng(client, url, credentials, &mut rand::thread_rng())
    }

    pub fn plan_with_rng<C: RepositoryClient, R: Rng + ?Sized>(
        &self,
        client: &C,
        url: &str,
        credentials: &CredentialStore,
        rng: &mut R,
    ) -> Result<BranchPlan> {
        match self {
            Self::Generated { prefix } => Ok(BranchPlan {
                branch: generate_branch_name(prefix, rng),
                clone_branch: None,
                create: true,
            }),
            Self::Fixed { name } => {
                let exists = client.remote_has_branch(url, credentials, name)?;
                tracing::debug!(branch = %name, exists, "checked fixed branch on remote");
                Ok(BranchPlan {
                    branch: name.clone(),
                    clone_branch: exists.then(|| name.clone()),
                    create: !exists,
                })
            }
        }
    }
}

/// `prefix` followed by [`SUFFIX_LEN`] characters, each drawn uniformly from
/// [`SUFFIX_ALPHABET`].
pub fn generate_branch_name<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect();
    format!("{prefix}{suffix}")
}
