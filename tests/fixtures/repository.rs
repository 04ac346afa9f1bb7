/// Throwaway git repositories driven by the real `git` binary
use globset::GlobSet;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use patchwright::branching::BranchManager;
use patchwright::config::BranchingConfig;
use patchwright::external::ProcessCommandExecutor;
use patchwright::reconcile::scan_tree;

pub struct RepositoryFixture {
    dir: TempDir,
}

impl RepositoryFixture {
    /// Repository on `main` with `files` committed
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let fixture = Self {
            dir: TempDir::new().expect("create temp dir"),
        };
        fixture.git(&["init", "--quiet"]);
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fixture.git(&["config", "user.name", "Patchwright Tests"]);
        fixture.git(&["config", "user.email", "tests@patchwright.invalid"]);
        fixture.git(&["config", "commit.gpgsign", "false"]);
        for (path, content) in files {
            fixture.write(path, content);
        }
        fixture.commit_all("initial commit");
        fixture
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(full, content).expect("write file");
    }

    pub fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.path().join(path)).ok()
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "--quiet", "--allow-empty", "-m", message]);
    }

    pub fn current_branch(&self) -> String {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Path to content hash of every file in the working tree
    pub fn tree_state(&self) -> BTreeMap<String, String> {
        scan_tree(self.path(), &GlobSet::empty(), u64::MAX)
            .files
            .into_iter()
            .map(|(path, checksum)| (path, checksum.hash))
            .collect()
    }

    pub fn branch_manager(&self) -> BranchManager {
        BranchManager::for_project(
            self.path(),
            Arc::new(ProcessCommandExecutor),
            BranchingConfig::default(),
            Duration::from_secs(30),
        )
    }
}
