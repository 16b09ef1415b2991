//! Repository operations used by a provisioning run.
//!
//! [`RepositoryClient`] is the seam the orchestrator is generic over;
//! [`GitClient`] is the libgit2 implementation used in production.

use std::cell::RefCell;
use std::path::Path;
use std::time::{Duration, Instant};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, CertificateCheckStatus, Direction, ErrorClass, ErrorCode, FetchOptions, Oid,
    PushOptions, Remote, RemoteCallbacks, Repository, Signature,
};

use crate::credentials::CredentialStore;
use crate::error::{ProvisionError, Result};
use crate::remote_url::redact;

/// Author and committer recorded on provisioning commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Clone, branch, commit and push against a target repository.
pub trait RepositoryClient {
    /// Handle to a local clone.
    type Repo;

    /// Whether `refs/heads/<branch>` exists on the remote at `url`.
    fn remote_has_branch(
        &self,
        url: &str,
        credentials: &CredentialStore,
        branch: &str,
    ) -> Result<bool>;

    /// Clone `url` into `dest`, checking out `branch` instead of the remote's
    /// default branch when given.
    fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        credentials: &CredentialStore,
        branch: Option<&str>,
    ) -> Result<Self::Repo>;

    /// Switch the working tree to `branch`, first creating it from the current
    /// head when `create` is set.
    fn checkout_or_create(&self, repo: &Self::Repo, branch: &str, create: bool) -> Result<()>;

    /// Add (or replace) remote `remote` pointing at `url`, with push ref-spec
    /// `HEAD:refs/heads/<branch>`.
    fn register_push_target(
        &self,
        repo: &Self::Repo,
        remote: &str,
        url: &str,
        branch: &str,
    ) -> Result<()>;

    /// Stage exactly `file` (relative to the tree root) and commit it.
    fn commit_file(
        &self,
        repo: &Self::Repo,
        file: &str,
        message: &str,
        identity: &CommitIdentity,
    ) -> Result<Oid>;

    /// Push according to the push ref-specs registered on `remote`.
    fn push(&self, repo: &Self::Repo, credentials: &CredentialStore, remote: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
        }
    }

    fn expired(self) -> bool {
        Instant::now() >= self.at
    }

    /// Fail with a `Timeout` error once the deadline has passed.
    fn check(self) -> std::result::Result<(), git2::Error> {
        if self.expired() {
            return Err(git2::Error::new(
                ErrorCode::Timeout,
                ErrorClass::Net,
                format!("deadline of {}s exceeded", self.timeout.as_secs()),
            ));
        }
        Ok(())
    }

    /// Reword an error caused by a callback aborting past the deadline. The
    /// original code and class are kept.
    fn annotate(self, err: git2::Error) -> git2::Error {
        if !self.expired() || err.code() == ErrorCode::Timeout {
            return err;
        }
        git2::Error::new(
            err.code(),
            err.class(),
            format!(
                "deadline of {}s exceeded ({})",
                self.timeout.as_secs(),
                err.message()
            ),
        )
    }
}

/// Apply `timeout` to libgit2's connect and socket read/write timeouts for
/// the whole process, so a stalled server cannot hold an operation past its
/// deadline.
///
/// Call once at startup, before any network operation runs.
pub fn install_transport_timeouts(timeout: Duration) -> std::result::Result<(), git2::Error> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: libgit2 options are process-global and not synchronized; this
    // runs before any other thread touches libgit2.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    tracing::debug!(timeout_ms = millis, "configured git transport timeouts");
    Ok(())
}

/// libgit2-backed [`RepositoryClient`].
///
/// Every network operation (remote listing, clone, push) runs under its own
/// deadline. Transfer and sideband progress abort once it passes, certificate
/// checks and push negotiation refuse, and each operation checks it again
/// between phases. Stalled sockets are bounded by
/// [`install_transport_timeouts`].
#[derive(Debug, Clone)]
pub struct GitClient {
    timeout: Duration,
}

impl GitClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn callbacks<'a>(
        &self,
        credentials: &'a CredentialStore,
        deadline: Deadline,
    ) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        credentials.install(&mut callbacks);
        callbacks.transfer_progress(move |_| !deadline.expired());
        callbacks.sideband_progress(move |_| !deadline.expired());
        callbacks.certificate_check(move |_, _| {
            deadline.check()?;
            Ok(CertificateCheckStatus::CertificatePassthrough)
        });
        callbacks.push_negotiation(move |_| deadline.check());
        callbacks
    }
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl RepositoryClient for GitClient {
    type Repo = Repository;

    fn remote_has_branch(
        &self,
        url: &str,
        credentials: &CredentialStore,
        branch: &str,
    ) -> Result<bool> {
        let deadline = Deadline::after(self.timeout);
        let map = |source: git2::Error| ProvisionError::RemoteQuery {
            url: redact(url),
            source: deadline.annotate(source),
        };

        let mut remote = Remote::create_detached(url).map_err(map)?;
        let connection = remote
            .connect_auth(
                Direction::Fetch,
                Some(self.callbacks(credentials, deadline)),
                None,
            )
            .map_err(map)?;
        deadline.check().map_err(map)?;
        let wanted = format!("refs/heads/{branch}");
        let found = connection
            .list()
            .map_err(map)?
            .iter()
            .any(|head| head.name() == wanted);

        tracing::debug!(url = %redact(url), branch, found, "queried remote branches");
        Ok(found)
    }

    fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        credentials: &CredentialStore,
        branch: Option<&str>,
    ) -> Result<Repository> {
        let deadline = Deadline::after(self.timeout);
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(self.callbacks(credentials, deadline));

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch);
        if let Some(branch) = branch {
            builder.branch(branch);
        }

        let map = |source: git2::Error| ProvisionError::Clone {
            url: redact(url),
            source: deadline.annotate(source),
        };
        let repo = builder.clone(url, dest).map_err(map)?;
        deadline.check().map_err(map)?;
        tracing::info!(path = %repo.path().display(), branch = ?branch, "cloned repository");
        Ok(repo)
    }

    fn checkout_or_create(&self, repo: &Repository, branch: &str, create: bool) -> Result<()> {
        let map = |source: git2::Error| ProvisionError::Branch {
            branch: branch.to_string(),
            source,
        };

        if create {
            let head = repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(map)?;
            repo.branch(branch, &head, false).map_err(map)?;
        }

        let reference = repo
            .find_branch(branch, BranchType::Local)
            .map_err(map)?
            .into_reference();
        let refname = reference
            .name()
            .ok_or_else(|| git2::Error::from_str("branch reference is not valid UTF-8"))
            .map_err(map)?
            .to_string();
        let tree = reference.peel_to_tree().map_err(map)?;

        repo.checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().safe()))
            .map_err(map)?;
        repo.set_head(&refname).map_err(map)?;

        tracing::debug!(branch, created = create, "checked out branch");
        Ok(())
    }

    fn register_push_target(
        &self,
        repo: &Repository,
        remote: &str,
        url: &str,
        branch: &str,
    ) -> Result<()> {
        let map = |source: git2::Error| ProvisionError::Config {
            remote: remote.to_string(),
            source,
        };

        if repo.find_remote(remote).is_ok() {
            repo.remote_delete(remote).map_err(map)?;
        }
        repo.remote(remote, url).map_err(map)?;
        let refspec = format!("HEAD:refs/heads/{branch}");
        repo.remote_add_push(remote, &refspec).map_err(map)?;

        tracing::debug!(remote, refspec = %refspec, "registered push target");
        Ok(())
    }

    fn commit_file(
        &self,
        repo: &Repository,
        file: &str,
        message: &str,
        identity: &CommitIdentity,
    ) -> Result<Oid> {
        let map = |source: git2::Error| ProvisionError::Commit {
            file: file.to_string(),
            source,
        };

        let mut index = repo.index().map_err(map)?;
        index.add_path(Path::new(file)).map_err(map)?;
        index.write().map_err(map)?;
        let tree_id = index.write_tree().map_err(map)?;
        let tree = repo.find_tree(tree_id).map_err(map)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(map)?),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                None
            }
            Err(err) => return Err(map(err)),
        };
        if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
            return Err(map(git2::Error::from_str("nothing to commit")));
        }

        let signature =
            Signature::now(&identity.name, &identity.email).map_err(ProvisionError::Identity)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parents,
            )
            .map_err(map)?;
        Ok(oid)
    }

    fn push(&self, repo: &Repository, credentials: &CredentialStore, remote: &str) -> Result<()> {
        let deadline = Deadline::after(self.timeout);
        let map = |source: git2::Error| ProvisionError::Push {
            remote: remote.to_string(),
            source: deadline.annotate(source),
        };

        let mut target = repo.find_remote(remote).map_err(map)?;
        let refspecs: Vec<String> = target
            .push_refspecs()
            .map_err(map)?
            .iter()
            .flatten()
            .map(str::to_string)
            .collect();
        if refspecs.is_empty() {
            return Err(map(git2::Error::from_str("no push ref-spec registered")));
        }

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = self.callbacks(credentials, deadline);
        callbacks.push_update_reference(|refname, status| {
            if let Some(status) = status {
                *rejection.borrow_mut() = Some(format!("{refname}: {status}"));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        deadline.check().map_err(map)?;
        target.push(&refspecs, Some(&mut options)).map_err(map)?;
        drop(options);

        if let Some(reason) = rejection.into_inner() {
            return Err(map(git2::Error::from_str(&format!(
                "remote rejected {reason}"
            ))));
        }
        tracing::debug!(remote, refspecs = ?refspecs, "pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_annotates_only_after_expiry() {
        let live = Deadline::after(Duration::from_secs(60));
        assert!(!live.expired());
        let err = live.annotate(git2::Error::from_str("boom"));
        assert_eq!(err.message(), "boom");

        let expired = Deadline::after(Duration::ZERO);
        assert!(expired.expired());
        let err = expired.annotate(git2::Error::from_str("boom"));
        assert!(err.message().contains("deadline of 0s exceeded"));
        assert!(err.message().contains("boom"));
    }

    #[test]
    fn annotate_keeps_code_and_class() {
        let expired = Deadline::after(Duration::ZERO);
        let original = git2::Error::new(
            ErrorCode::NotFastForward,
            ErrorClass::Reference,
            "cannot push non-fastforwardable reference",
        );

        let err = expired.annotate(original);

        assert_eq!(err.code(), ErrorCode::NotFastForward);
        assert_eq!(err.class(), ErrorClass::Reference);
        assert!(err.message().contains("non-fastforwardable"));
    }

    #[test]
    fn check_fails_with_timeout_once_expired() {
        assert!(Deadline::after(Duration::from_secs(60)).check().is_ok());

        let err = Deadline::after(Duration::ZERO).check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(err.class(), ErrorClass::Net);

        let again = Deadline::after(Duration::ZERO).annotate(err);
        assert_eq!(again.message(), "deadline of 0s exceeded");
    }

    #[test]
    fn transport_timeouts_follow_operation_timeout() {
        install_transport_timeouts(Duration::from_secs(45)).unwrap();
        // SAFETY: reads of process-global options; nothing else sets them.
        let (connect, server) = unsafe {
            (
                git2::opts::get_server_connect_timeout_in_milliseconds().unwrap(),
                git2::opts::get_server_timeout_in_milliseconds().unwrap(),
            )
        };
        assert_eq!(connect, 45_000);
        assert_eq!(server, 45_000);
    }

    #[test]
    fn default_client_uses_two_minute_timeout() {
        assert_eq!(GitClient::default().timeout(), Duration::from_secs(120));
    }
}
