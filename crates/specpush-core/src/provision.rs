//! End-to-end provisioning runs.
//!
//! A run clones the target repository into a fresh workspace, switches to the
//! branch chosen by its [`BranchStrategy`], writes the specification, commits
//! and pushes. [`Provisioner::generate`] reduces every failure to
//! [`Outcome::Failed`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use git2::Oid;
use serde_json::Value;

use crate::artifact::ArtifactWriter;
use crate::config::{GenerateMode, ProvisionerConfig};
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::remote_url::{branch_web_url, redact};
use crate::repository::{CommitIdentity, GitClient, RepositoryClient};
use crate::strategy::BranchStrategy;
use crate::workspace::TempWorkspace;

/// Status token returned to callers of [`Provisioner::generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub branch: String,
    /// Whether the branch was created by this run
    pub created: bool,
    pub commit: Oid,
}

/// Publishes specifications into one remote repository.
#[derive(Debug)]
pub struct Provisioner<C = GitClient> {
    client: C,
    repo_url: String,
    credentials: CredentialStore,
    identity: CommitIdentity,
    writer: ArtifactWriter,
    commit_message: String,
    remote_name: String,
    workspace_prefix: String,
    workspace_dir: Option<PathBuf>,
    mode: GenerateMode,
    branch_prefix: String,
    fixed_branch: String,
}

impl Provisioner<GitClient> {
    /// Build a provisioner backed by libgit2.
    pub fn from_config(config: &ProvisionerConfig) -> anyhow::Result<Self> {
        let client = GitClient::new(Duration::from_secs(config.provision.timeout_secs));
        Self::with_client(client, config)
    }
}

impl<C: RepositoryClient> Provisioner<C> {
    /// Build a provisioner that performs repository operations through
    /// `client`.
    pub fn with_client(client: C, config: &ProvisionerConfig) -> anyhow::Result<Self> {
        let settings = &config.provision;
        Ok(Self {
            client,
            repo_url: config.repo_url()?.to_string(),
            credentials: config.credentials()?,
            identity: config.identity(),
            writer: ArtifactWriter::new(&settings.file_name),
            commit_message: settings.commit_message.clone(),
            remote_name: settings.remote_name.clone(),
            workspace_prefix: settings.workspace_prefix.clone(),
            workspace_dir: settings.workspace_dir.clone(),
            mode: settings.mode,
            branch_prefix: settings.branch_prefix.clone(),
            fixed_branch: settings.fixed_branch.clone(),
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Strategies `generate` runs, in order.
    pub fn strategies(&self) -> Vec<BranchStrategy> {
        let mut strategies = vec![BranchStrategy::generated(&self.branch_prefix)];
        if self.mode == GenerateMode::GeneratedAndDev {
            strategies.push(BranchStrategy::fixed(&self.fixed_branch));
        }
        strategies
    }

    /// Publish `specification` with every configured strategy.
    ///
    /// Stops at the first failed run. The error is logged; callers only see
    /// [`Outcome::Failed`].
    pub fn generate(&self, specification: &Value) -> Outcome {
        tracing::debug!(specification = %specification, "received specification");
        for strategy in self.strategies() {
            match self.run(specification, &strategy) {
                Ok(report) => tracing::info!(
                    flavor = strategy.label(),
                    branch = %report.branch,
                    created = report.created,
                    commit = %report.commit,
                    "provisioned specification"
                ),
                Err(err) => {
                    tracing::warn!(
                        flavor = strategy.label(),
                        step = err.step(),
                        error = %err,
                        cause = %err.cause(),
                        "provisioning failed"
                    );
                    return Outcome::Failed;
                }
            }
        }
        Outcome::Done
    }

    /// One complete run in a fresh workspace. The workspace is removed before
    /// this returns, whatever the outcome.
    pub fn run(&self, specification: &Value, strategy: &BranchStrategy) -> Result<ProvisionReport> {
        let _span = tracing::info_span!("provision", flavor = strategy.label()).entered();
        let workspace = match &self.workspace_dir {
            Some(base) => TempWorkspace::acquire_in(base, &self.workspace_prefix)?,
            None => TempWorkspace::acquire(&self.workspace_prefix)?,
        };
        let result = self.run_in(&workspace, specification, strategy);
        workspace.release();
        result
    }

    fn run_in(
        &self,
        workspace: &TempWorkspace,
        specification: &Value,
        strategy: &BranchStrategy,
    ) -> Result<ProvisionReport> {
        let plan = strategy.plan(&self.client, &self.repo_url, &self.credentials)?;

        let repo = self.client.clone_repo(
            &self.repo_url,
            workspace.path(),
            &self.credentials,
            plan.clone_branch.as_deref(),
        )?;
        tracing::info!(url = %redact(&self.repo_url), "cloned repo");

        self.client
            .checkout_or_create(&repo, &plan.branch, plan.create)?;
        tracing::info!(
            branch = %plan.branch,
            url = %branch_web_url(&self.repo_url, &plan.branch),
            "git branch url"
        );

        self.client
            .register_push_target(&repo, &self.remote_name, &self.repo_url, &plan.branch)?;
        self.writer.write(workspace.path(), specification)?;

        let commit = self.client.commit_file(
            &repo,
            self.writer.file_name(),
            &self.commit_message,
            &self.identity,
        )?;
        tracing::info!(commit = %commit, "committed");

        self.client
            .push(&repo, &self.credentials, &self.remote_name)?;
        tracing::info!(commit = %commit, remote = %self.remote_name, "pushed");

        Ok(ProvisionReport {
            branch: plan.branch,
            created: plan.create,
            commit,
        })
    }
}
