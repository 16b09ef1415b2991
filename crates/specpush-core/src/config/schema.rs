//! Configuration schema for specpush.toml
//!
//! ```toml
//! [git]
//! url = "https://git.example.com/org/specs.git"
//! username = "bot"
//! password = "secret"
//!
//! [provision]
//! mode = "generated-and-dev"
//!
//! [server]
//! bind = "0.0.0.0:8080"
//! ```

use std::path::PathBuf;

use anyhow::Context;
use secrecy::SecretString;
use serde::Deserialize;

use crate::credentials::CredentialStore;
use crate::repository::CommitIdentity;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(default)]
    pub git: GitSettings,

    #[serde(default)]
    pub provision: ProvisionSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

/// Target repository and the identity used to write to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Remote repository URL (required)
    pub url: Option<String>,
    /// Username for authentication (required)
    pub username: Option<String>,
    /// Password or access token (required)
    pub password: Option<SecretString>,
    /// Author/committer name on provisioning commits
    pub author_name: String,
    /// Author/committer email on provisioning commits
    pub author_email: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            author_name: "specpush".to_string(),
            author_email: "specpush@localhost".to_string(),
        }
    }
}

/// Which flavors `generate` runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerateMode {
    /// Only the generated-branch flavor
    #[default]
    Generated,
    /// Generated-branch flavor followed by the fixed-branch flavor
    GeneratedAndDev,
}

impl std::str::FromStr for GenerateMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(Self::Generated),
            "generated-and-dev" => Ok(Self::GeneratedAndDev),
            other => anyhow::bail!(
                "Unknown mode '{other}' (expected 'generated' or 'generated-and-dev')"
            ),
        }
    }
}

/// Workflow parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    pub mode: GenerateMode,
    /// Prefix of generated branch names
    pub branch_prefix: String,
    /// Name of the reusable branch
    pub fixed_branch: String,
    /// Artifact file written at the repository root
    pub file_name: String,
    pub commit_message: String,
    /// Remote registered as push target
    pub remote_name: String,
    /// Prefix of ephemeral clone directories
    pub workspace_prefix: String,
    /// Parent directory for clones; system temp dir when unset
    pub workspace_dir: Option<PathBuf>,
    /// Deadline for each network operation, in seconds
    pub timeout_secs: u64,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            mode: GenerateMode::Generated,
            branch_prefix: "api-spec-".to_string(),
            fixed_branch: "dev".to_string(),
            file_name: "openapi-spec.json".to_string(),
            commit_message: "\u{1F9A9} Initial commit \u{1F9A9}".to_string(),
            remote_name: "gogs".to_string(),
            workspace_prefix: "tempRepo".to_string(),
            workspace_dir: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Upper bound on one `/v1/api/generate` request, in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 600,
        }
    }
}

impl ProvisionerConfig {
    /// Apply environment overrides. `lookup` returns the value of a variable
    /// if it is set.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SPECPUSH_GIT_URL") {
            self.git.url = Some(url);
        }
        if let Some(username) = lookup("SPECPUSH_GIT_USERNAME") {
            self.git.username = Some(username);
        }
        if let Some(password) = lookup("SPECPUSH_GIT_PASSWORD") {
            self.git.password = Some(SecretString::from(password));
        }
    }

    /// Check that required values are present and usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.repo_url()?;
        self.credentials()?;
        if self.provision.branch_prefix.is_empty() {
            anyhow::bail!("provision.branch_prefix must not be empty");
        }
        if self.provision.fixed_branch.is_empty() {
            anyhow::bail!("provision.fixed_branch must not be empty");
        }
        if self.provision.remote_name.is_empty() {
            anyhow::bail!("provision.remote_name must not be empty");
        }
        if self.provision.timeout_secs == 0 {
            anyhow::bail!("provision.timeout_secs must be greater than zero");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn repo_url(&self) -> anyhow::Result<&str> {
        self.git
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .context("Missing required setting git.url (or SPECPUSH_GIT_URL)")
    }

    pub fn credentials(&self) -> anyhow::Result<CredentialStore> {
        let username = self
            .git
            .username
            .clone()
            .context("Missing required setting git.username (or SPECPUSH_GIT_USERNAME)")?;
        let password = self
            .git
            .password
            .clone()
            .context("Missing required setting git.password (or SPECPUSH_GIT_PASSWORD)")?;
        Ok(CredentialStore::new(username, password))
    }

    pub fn identity(&self) -> CommitIdentity {
        CommitIdentity::new(&self.git.author_name, &self.git.author_email)
    }
}
