use chrono::{DateTime, TimeZone, Utc};
use git2::{ObjectType, Oid, Repository};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Failed to open git repository at {path}: {source}")]
    Open { path: PathBuf, source: git2::Error },
    #[error("Revision '{rev}' could not be resolved: {source}")]
    Revision { rev: String, source: git2::Error },
}

/// Read-only questions about repository history.
///
/// Mutation always goes through the `git` command surface; this side only
/// verifies what that surface produced.
pub trait RepositoryInspector: Send + Sync {
    /// Whether `commit` names a commit reachable in the object database
    fn commit_exists(&self, commit: &str) -> bool;

    /// Tree id of `rev`, equal for identical content
    fn tree_id(&self, rev: &str) -> Result<String, InspectError>;

    /// Blob content of `path` at `rev`, `None` when absent
    fn file_at(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>, InspectError>;

    /// Full message and committer time of `rev`
    fn commit_details(&self, rev: &str) -> Result<CommitDetails, InspectError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDetails {
    pub id: String,
    pub message: String,
    pub committed_at: DateTime<Utc>,
}

/// libgit2-backed inspector.
///
/// Opens the repository per call so the handle never crosses an await point.
#[derive(Debug, Clone)]
pub struct Git2Inspector {
    path: PathBuf,
}

impl Git2Inspector {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> Result<Repository, InspectError> {
        Repository::open(&self.path).map_err(|source| InspectError::Open {
            path: self.path.clone(),
            source,
        })
    }
}

impl RepositoryInspector for Git2Inspector {
    fn commit_exists(&self, commit: &str) -> bool {
        let Ok(repo) = self.open() else {
            return false;
        };
        let Ok(oid) = Oid::from_str(commit) else {
            return false;
        };
        let found = repo.find_commit(oid).is_ok();
        found
    }

    fn tree_id(&self, rev: &str) -> Result<String, InspectError> {
        let repo = self.open()?;
        let tree = repo
            .revparse_single(rev)
            .and_then(|object| object.peel_to_tree())
            .map_err(|source| InspectError::Revision {
                rev: rev.to_string(),
                source,
            })?;
        Ok(tree.id().to_string())
    }

    fn file_at(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>, InspectError> {
        let repo = self.open()?;
        let tree = repo
            .revparse_single(rev)
            .and_then(|object| object.peel_to_tree())
            .map_err(|source| InspectError::Revision {
                rev: rev.to_string(),
                source,
            })?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = entry
            .to_object(&repo)
            .and_then(|object| object.peel_to_blob())
            .map_err(|source| InspectError::Revision {
                rev: format!("{rev}:{path}"),
                source,
            })?;
        Ok(Some(blob.content().to_vec()))
    }

    fn commit_details(&self, rev: &str) -> Result<CommitDetails, InspectError> {
        let repo = self.open()?;
        let commit = repo
            .revparse_single(rev)
            .and_then(|object| object.peel_to_commit())
            .map_err(|source| InspectError::Revision {
                rev: rev.to_string(),
                source,
            })?;

        let committed_at = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        Ok(CommitDetails {
            id: commit.id().to_string(),
            message: commit.message().unwrap_or_default().to_string(),
            committed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("hello.txt"), "hello\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("hello.txt")).unwrap();
        index.write().unwrap();

        let signature = Signature::now("Test", "test@example.com").unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let commit = repo
            .commit(Some("HEAD"), &signature, &signature, "Initial commit", &tree, &[])
            .unwrap();

        (temp_dir, commit.to_string())
    }

    #[test]
    fn test_commit_exists() {
        let (temp_dir, commit) = create_test_repo();
        let inspector = Git2Inspector::new(temp_dir.path());

        assert!(inspector.commit_exists(&commit));
        assert!(!inspector.commit_exists("0000000000000000000000000000000000000000"));
        assert!(!inspector.commit_exists("not-a-hash"));
    }

    #[test]
    fn test_file_at_revision() {
        let (temp_dir, commit) = create_test_repo();
        let inspector = Git2Inspector::new(temp_dir.path());

        let content = inspector.file_at(&commit, "hello.txt").unwrap();
        assert_eq!(content.as_deref(), Some(&b"hello\n"[..]));
        assert_eq!(inspector.file_at("HEAD", "missing.txt").unwrap(), None);
    }

    #[test]
    fn test_tree_id_matches_for_same_revision() {
        let (temp_dir, commit) = create_test_repo();
        let inspector = Git2Inspector::new(temp_dir.path());

        assert_eq!(inspector.tree_id("HEAD").unwrap(), inspector.tree_id(&commit).unwrap());
        assert!(inspector.tree_id("no-such-branch").is_err());
    }

    #[test]
    fn test_commit_details() {
        let (temp_dir, commit) = create_test_repo();
        let inspector = Git2Inspector::new(temp_dir.path());

        let details = inspector.commit_details("HEAD").unwrap();
        assert_eq!(details.id, commit);
        assert_eq!(details.message, "Initial commit");
    }
}
