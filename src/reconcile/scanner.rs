//! Live tree state: one checksum per indexable file.

use chrono::{DateTime, Utc};
use globset::GlobSet;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use super::types::FileChecksum;
use crate::index::content_hash;

/// Files present in the tree. `unindexable` files exist but are never given
/// records (too large or not text), so their records are not orphans either.
#[derive(Debug, Clone, Default)]
pub struct TreeState {
    pub files: BTreeMap<String, FileChecksum>,
    pub unindexable: BTreeSet<String>,
}

impl TreeState {
    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.unindexable.contains(path)
    }

    pub fn scanned(&self) -> usize {
        self.files.len() + self.unindexable.len()
    }
}

pub fn scan_tree(root: &Path, ignored: &GlobSet, max_file_bytes: u64) -> TreeState {
    let mut state = TreeState::default();
    for path in crate::fs::list_project_files(root, ignored) {
        let full = root.join(&path);
        let metadata = match std::fs::metadata(&full) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(file = %path, error = %e, "File vanished during scan");
                continue;
            }
        };
        if metadata.len() > max_file_bytes {
            state.unindexable.insert(path);
            continue;
        }
        let bytes = match std::fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(file = %path, error = %e, "Unreadable file during scan");
                state.unindexable.insert(path);
                continue;
            }
        };
        if std::str::from_utf8(&bytes).is_err() {
            state.unindexable.insert(path);
            continue;
        }
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        state.files.insert(
            path.clone(),
            FileChecksum {
                path,
                hash: content_hash(&bytes),
                size: metadata.len(),
                modified,
            },
        );
    }
    state
}
