//! Manifest collection persistence.
//!
//! The whole collection is written as one JSON array. Saves go through a
//! temp file in the same directory followed by a rename, so readers and
//! restarts only ever observe a complete snapshot.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::manifest::Manifest;

/// Errors from loading or saving the manifest collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize manifests: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("manifest file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads and atomically replaces the manifest collection file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the collection.
    ///
    /// Returns an empty collection if the file doesn't exist.
    /// Returns an error if the file exists but can't be read or parsed.
    pub fn load(&self) -> Result<Vec<Manifest>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No manifest file, starting empty");
            return Ok(Vec::new());
        }

        let content = fs::read(&self.path).map_err(io_err(&self.path))?;

        let manifests: Vec<Manifest> =
            serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        info!(
            path = %self.path.display(),
            manifest_count = manifests.len(),
            "Loaded manifests from disk"
        );

        Ok(manifests)
    }

    /// Save the full collection atomically (write temp, fsync, rename).
    pub fn save(&self, manifests: &[Manifest]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
        }

        let content = serde_json::to_vec(manifests)?;

        let tmp_path = self.tmp_path();
        let mut file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        file.write_all(&content).map_err(io_err(&tmp_path))?;
        file.sync_all().map_err(io_err(&tmp_path))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;

        debug!(
            path = %self.path.display(),
            manifest_count = manifests.len(),
            "Saved manifests to disk"
        );

        Ok(())
    }

    // `manifests.json` -> `manifests.json.tmp`, next to the target.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Compression, ImageFile, ManifestDraft, ManifestState};
    use tempfile::TempDir;

    fn sample(name: &str) -> Manifest {
        let mut m = Manifest::from_draft(
            ManifestDraft {
                name: name.to_string(),
                owner: "o1".to_string(),
                ..Default::default()
            },
            format!("uuid-{name}"),
        );
        m.files.push(ImageFile {
            sha1: "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".to_string(),
            size: 5,
            compression: Compression::None,
        });
        m.state = ManifestState::Active;
        m.disabled = false;
        m.published_at = "2024-01-01T00:00:00Z".to_string();
        m
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ManifestStore::new(tmp.path().join("manifests.json"));

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ManifestStore::new(tmp.path().join("manifests.json"));

        store.save(&[]).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
    }

    #[test]
    fn test_roundtrip_non_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ManifestStore::new(tmp.path().join("nested/dir/manifests.json"));

        let manifests = vec![sample("a"), sample("b")];
        store.save(&manifests).unwrap();

        assert_eq!(store.load().unwrap(), manifests);
        assert!(!tmp.path().join("nested/dir/manifests.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = ManifestStore::new(tmp.path().join("manifests.json"));

        store.save(&[sample("a"), sample("b")]).unwrap();
        store.save(&[sample("c")]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "c");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifests.json");
        fs::write(&path, b"{not json").unwrap();

        let err = ManifestStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let tmp = TempDir::new().unwrap();
        // Parent "directory" is a regular file.
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let store = ManifestStore::new(blocker.join("manifests.json"));
        assert!(matches!(store.save(&[]), Err(StoreError::Io { .. })));
    }
}
