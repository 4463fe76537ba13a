use std::collections::HashMap;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::transfer::PARTIAL_EXTENSION;

/// Snapshot of the local mirror taken before a sync pass: relative file path
/// to last-modified time. It is not updated while the pass writes files.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    root: PathBuf,
    files: HashMap<PathBuf, OffsetDateTime>,
}

impl LocalIndex {
    pub fn build(root: &Path) -> Self {
        let mut files = HashMap::new();
        if !root.exists() {
            debug!(root = %root.display(), "local root missing, starting with empty index");
            return Self {
                root: root.to_path_buf(),
                files,
            };
        }

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("failed to read local entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_partial(&entry) {
                continue;
            }
            let modified = match entry.metadata().map(|meta| meta.modified()) {
                Ok(Ok(modified)) => OffsetDateTime::from(modified),
                Ok(Err(err)) => {
                    warn!(path = %entry.path().display(), "mtime unavailable: {err}");
                    continue;
                }
                Err(err) => {
                    warn!(path = %entry.path().display(), "metadata unavailable: {err}");
                    continue;
                }
            };
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.insert(relative.to_path_buf(), modified);
            }
        }

        debug!(root = %root.display(), files = files.len(), "local index built");
        Self {
            root: root.to_path_buf(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn modified(&self, relative: &Path) -> Option<OffsetDateTime> {
        self.files.get(relative).copied()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Leftovers of interrupted downloads never count as a local copy.
fn is_partial(entry: &DirEntry) -> bool {
    entry
        .path()
        .extension()
        .is_some_and(|ext| ext == PARTIAL_EXTENSION)
}
