use std::path::{Path, PathBuf};

use git2::{BranchType, Oid, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

/// A bare repository standing in for the upstream, seeded with one commit on
/// `main`.
pub struct Remote {
    _temp: TempDir,
    pub path: PathBuf,
}

impl Remote {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("remote.git");

        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head("main");
        let repo = Repository::init_opts(&path, &opts).expect("Failed to init bare repo");

        commit_file(&repo, "refs/heads/main", "README.md", "# specs\n", "init");

        Self { _temp: temp, path }
    }

    pub fn url(&self) -> String {
        self.path.to_str().expect("utf-8 temp path").to_string()
    }

    pub fn repo(&self) -> Repository {
        Repository::open_bare(&self.path).expect("Failed to open bare repo")
    }

    pub fn branches(&self) -> Vec<String> {
        let repo = self.repo();
        let mut names: Vec<String> = repo
            .branches(Some(BranchType::Local))
            .unwrap()
            .map(|b| b.unwrap().0.name().unwrap().unwrap().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn head_of(&self, branch: &str) -> Option<Oid> {
        self.repo()
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()
            .and_then(|r| r.target())
    }

    /// Contents of `file` at the tip of `branch`.
    pub fn read(&self, branch: &str, file: &str) -> Option<String> {
        let repo = self.repo();
        let reference = repo.find_reference(&format!("refs/heads/{branch}")).ok()?;
        let tree = reference.peel_to_tree().ok()?;
        let entry = tree.get_path(Path::new(file)).ok()?;
        let blob = repo.find_blob(entry.id()).ok()?;
        String::from_utf8(blob.content().to_vec()).ok()
    }

    pub fn message_of(&self, branch: &str) -> String {
        let repo = self.repo();
        let commit = repo
            .find_reference(&format!("refs/heads/{branch}"))
            .unwrap()
            .peel_to_commit()
            .unwrap();
        commit.message().unwrap().to_string()
    }

    pub fn parent_of(&self, branch: &str) -> Option<Oid> {
        let repo = self.repo();
        let commit = repo
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()?
            .peel_to_commit()
            .ok()?;
        commit.parent_id(0).ok()
    }

    /// Add a commit writing `file` on top of `branch`, creating the branch
    /// from `main` if needed.
    pub fn commit(&self, branch: &str, file: &str, content: &str) -> Oid {
        let repo = self.repo();
        let refname = format!("refs/heads/{branch}");
        if repo.find_reference(&refname).is_err() {
            let main = repo
                .find_reference("refs/heads/main")
                .unwrap()
                .peel_to_commit()
                .unwrap();
            repo.branch(branch, &main, false).unwrap();
        }
        commit_file(&repo, &refname, file, content, "upstream change")
    }
}

fn commit_file(repo: &Repository, refname: &str, file: &str, content: &str, message: &str) -> Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let parent = repo
        .find_reference(refname)
        .ok()
        .map(|r| r.peel_to_commit().unwrap());

    let blob = repo.blob(content.as_bytes()).unwrap();
    let base_tree = parent.as_ref().map(|c| c.tree().unwrap());
    let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
    builder.insert(file, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some(refname), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Count entries left in a workspace base directory.
pub fn leftover_entries(base: &Path) -> usize {
    std::fs::read_dir(base).map(|d| d.count()).unwrap_or(0)
}
