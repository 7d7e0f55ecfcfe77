//! Datastore capability and the local-directory default.
//!
//! The hosting framework owns study storage; this module provides the
//! capability interface plus the default implementation the application
//! bootstrap delegates to, which simply lists NIfTI volumes under the
//! studies directory.

use crate::core::errors::SegResult;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Capability contract for study storage.
pub trait Datastore: Send + Sync {
    /// Short name identifying the datastore kind.
    fn name(&self) -> &str;

    /// Lists the image volumes available for annotation.
    fn list_images(&self) -> SegResult<Vec<PathBuf>>;
}

/// Default datastore over a local studies directory.
#[derive(Debug, Clone)]
pub struct LocalDatastore {
    root: PathBuf,
}

impl LocalDatastore {
    /// Creates a datastore rooted at the given studies directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The studies directory this datastore reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_nifti(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

impl Datastore for LocalDatastore {
    fn name(&self) -> &str {
        "local"
    }

    fn list_images(&self) -> SegResult<Vec<PathBuf>> {
        let mut images = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && is_nifti(&path) {
                images.push(path);
            }
        }
        images.sort();
        debug!(root = %self.root.display(), count = images.len(), "listed study images");
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_nifti_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.nii.gz", "a.nii", "notes.txt", "c.dcm"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let datastore = LocalDatastore::new(dir.path());
        let images = datastore.list_images().unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.nii", "b.nii.gz"]);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let datastore = LocalDatastore::new("/nonexistent/studies");
        assert!(datastore.list_images().is_err());
    }
}
