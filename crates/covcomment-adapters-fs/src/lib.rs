//! Filesystem artifact reader adapter.

use covcomment_ports::ArtifactReader;
use std::path::{Path, PathBuf};

/// Reads artifacts from disk, resolving relative paths against `root`.
#[derive(Debug, Clone)]
pub struct FsArtifactReader {
    root: PathBuf,
}

impl FsArtifactReader {
    /// Create a new reader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        }
    }
}

impl ArtifactReader for FsArtifactReader {
    fn read_artifact(&self, path: &str) -> Result<String, String> {
        let full_path = self.resolve(path);
        std::fs::read_to_string(&full_path)
            .map_err(|e| format!("failed to read {}: {e}", full_path.display()))
    }
}
