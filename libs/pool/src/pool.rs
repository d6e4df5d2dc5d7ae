//! The image pool.
//!
//! Owns the in-memory manifest collection behind a single lock, enforces
//! the manifest lifecycle, and persists the whole collection after every
//! mutation before reporting success.
//!
//! Lifecycle:
//!
//! ```text
//! unactivated --activate--> active <--enable/disable--> disabled
//! ```
//!
//! An upload is accepted once, while the image is unactivated. Activation
//! requires the upload. Nothing returns to `unactivated`.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures_core::Stream;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::blob::{BlobError, BlobStore, BoxError, StoredBlob};
use crate::error::PoolError;
use crate::filter::{matches_all, Filter};
use crate::manifest::{Compression, ImageFile, Manifest, ManifestDraft, ManifestState};
use crate::store::ManifestStore;

/// What to do with an in-memory mutation when persisting it fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveFailurePolicy {
    /// Keep the mutation in memory; disk catches up on the next successful save.
    #[default]
    Retain,
    /// Undo the mutation so memory matches the last saved snapshot.
    Rollback,
}

impl FromStr for SaveFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "retain" => Ok(SaveFailurePolicy::Retain),
            "rollback" => Ok(SaveFailurePolicy::Rollback),
            other => Err(format!(
                "unknown save failure policy {other:?} (expected 'retain' or 'rollback')"
            )),
        }
    }
}

/// Configuration for the image pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Directory holding `{uuid}.{ext}` and `{uuid}.md5` files.
    pub image_dir: PathBuf,
    /// The manifest collection file.
    pub manifests_path: PathBuf,
    pub on_save_failure: SaveFailurePolicy,
}

/// Authoritative registry of image manifests and their blobs.
pub struct ImagePool {
    manifests: Mutex<Vec<Manifest>>,
    store: ManifestStore,
    blobs: BlobStore,
    /// Per-uuid upload locks so concurrent uploads to one image serialize.
    /// An entry lives only while some upload for that uuid holds it.
    upload_locks: UploadLocks,
    on_save_failure: SaveFailurePolicy,
}

impl ImagePool {
    /// Open the pool, loading any previously saved manifests.
    pub fn open(config: PoolConfig) -> Result<Self, PoolError> {
        let store = ManifestStore::new(config.manifests_path);
        let manifests = store.load()?;

        info!(
            manifests = %store.path().display(),
            image_dir = %config.image_dir.display(),
            count = manifests.len(),
            policy = ?config.on_save_failure,
            "Image pool opened"
        );

        Ok(Self {
            manifests: Mutex::new(manifests),
            store,
            blobs: BlobStore::new(config.image_dir),
            upload_locks: Arc::new(StdMutex::new(HashMap::new())),
            on_save_failure: config.on_save_failure,
        })
    }

    /// Get a manifest by uuid.
    pub async fn get(&self, uuid: &str) -> Result<Manifest, PoolError> {
        let manifests = self.manifests.lock().await;
        let idx = find_index(&manifests, uuid)?;
        debug!(uuid = %uuid, "Manifest lookup");
        Ok(manifests[idx].clone())
    }

    /// All manifests matching every filter, in insertion order.
    pub async fn list(&self, filters: &[Filter]) -> Vec<Manifest> {
        let manifests = self.manifests.lock().await;
        manifests
            .iter()
            .filter(|m| matches_all(filters, m))
            .cloned()
            .collect()
    }

    /// Create a new unactivated manifest from caller-supplied fields.
    pub async fn create(&self, draft: ManifestDraft) -> Result<Manifest, PoolError> {
        let manifest = Manifest::from_draft(draft, Uuid::new_v4().to_string());

        let mut manifests = self.manifests.lock().await;
        manifests.push(manifest.clone());
        self.commit(&mut manifests, &manifest.uuid, |m| {
            m.pop();
        })?;

        info!(uuid = %manifest.uuid, name = %manifest.name, owner = %manifest.owner, "Image created");
        Ok(manifest)
    }

    /// Upload the image's one and only file.
    ///
    /// The body is streamed to disk outside the collection lock; the
    /// manifest is only updated once the whole body has been stored.
    pub async fn add_file<S, E>(
        &self,
        uuid: &str,
        compression: &str,
        body: S,
    ) -> Result<Manifest, PoolError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        let compression =
            Compression::from_str(compression).map_err(PoolError::InvalidParameter)?;

        // Reject unknown or already uploaded images before taking a slot.
        self.check_upload_allowed(uuid).await?;

        let slot = UploadSlot::acquire(&self.upload_locks, uuid);
        let _upload = slot.lock.lock().await;

        // An upload that held the slot before us may have finished.
        self.check_upload_allowed(uuid).await?;

        let blob = self.blobs.ingest(uuid, compression, body).await?;

        let file = ImageFile {
            sha1: blob.sha1,
            size: blob.size,
            compression,
        };

        let manifest = self
            .update(uuid, move |m| {
                ensure_upload_allowed(m)?;
                m.files = vec![file];
                Ok(())
            })
            .await?;

        info!(uuid = %uuid, size = blob.size, compression = %compression, "Image file added");
        Ok(manifest)
    }

    /// Open the image's file for streaming.
    pub async fn get_file(&self, uuid: &str) -> Result<StoredBlob, PoolError> {
        let manifest = self.get(uuid).await?;
        let file = manifest
            .file()
            .ok_or_else(|| PoolError::ResourceNotFound(format!("image {uuid} has no file")))?;

        // A delete may have removed the files since the snapshot was taken.
        match self.blobs.open(uuid, file).await {
            Ok(blob) => Ok(blob),
            Err(BlobError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(uuid = %uuid, error = %e, "Image file vanished");
                Err(PoolError::ResourceNotFound(format!("image {uuid} has no file")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Activate an image that has its file uploaded.
    pub async fn activate(&self, uuid: &str) -> Result<Manifest, PoolError> {
        let manifest = self
            .update(uuid, |m| {
                if m.files.is_empty() {
                    return Err(PoolError::NoActivationNoFile);
                }
                if m.state != ManifestState::Unactivated {
                    return Err(PoolError::ImageAlreadyActivated);
                }

                m.state = ManifestState::Active;
                m.disabled = false;
                m.published_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                Ok(())
            })
            .await?;

        info!(uuid = %uuid, published_at = %manifest.published_at, "Image activated");
        Ok(manifest)
    }

    /// Disable (`true`) or re-enable (`false`) an image.
    pub async fn set_disabled(&self, uuid: &str, disabled: bool) -> Result<Manifest, PoolError> {
        let manifest = self
            .update(uuid, |m| {
                if !disabled && m.state == ManifestState::Unactivated {
                    return Err(PoolError::NotActivated);
                }

                m.state = if disabled {
                    ManifestState::Disabled
                } else {
                    ManifestState::Active
                };
                m.disabled = disabled;
                Ok(())
            })
            .await?;

        info!(uuid = %uuid, disabled = disabled, "Image disabled flag changed");
        Ok(manifest)
    }

    /// Delete an image.
    ///
    /// The manifest removal is persisted first. Blob files are removed
    /// afterwards; a failure there only leaves unreferenced files behind.
    pub async fn delete(&self, uuid: &str) -> Result<(), PoolError> {
        {
            let mut manifests = self.manifests.lock().await;
            let idx = find_index(&manifests, uuid)?;
            let removed = manifests.remove(idx);
            self.commit(&mut manifests, uuid, move |m| m.insert(idx, removed))?;
        }

        if let Err(e) = self.blobs.remove(uuid).await {
            warn!(uuid = %uuid, error = %e, "Failed to remove image files");
        }

        info!(uuid = %uuid, "Image deleted");
        Ok(())
    }

    /// Apply a guarded mutation to one manifest and persist.
    ///
    /// `apply` must check its guards before touching the manifest.
    async fn update<F>(&self, uuid: &str, apply: F) -> Result<Manifest, PoolError>
    where
        F: FnOnce(&mut Manifest) -> Result<(), PoolError>,
    {
        let mut manifests = self.manifests.lock().await;
        let idx = find_index(&manifests, uuid)?;

        let previous = manifests[idx].clone();
        apply(&mut manifests[idx])?;
        self.commit(&mut manifests, uuid, move |m| m[idx] = previous)?;

        Ok(manifests[idx].clone())
    }

    /// Save the collection; on failure apply the configured policy.
    fn commit<U>(&self, manifests: &mut Vec<Manifest>, uuid: &str, undo: U) -> Result<(), PoolError>
    where
        U: FnOnce(&mut Vec<Manifest>),
    {
        if let Err(e) = self.store.save(manifests) {
            error!(
                uuid = %uuid,
                error = %e,
                policy = ?self.on_save_failure,
                "Failed to persist manifests"
            );
            if self.on_save_failure == SaveFailurePolicy::Rollback {
                undo(manifests);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn check_upload_allowed(&self, uuid: &str) -> Result<(), PoolError> {
        let manifests = self.manifests.lock().await;
        let idx = find_index(&manifests, uuid)?;
        ensure_upload_allowed(&manifests[idx])
    }
}

type UploadLocks = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// A claim on one uuid's upload lock.
///
/// Dropping the last claim removes the map entry, including when the
/// upload future is cancelled mid-stream.
struct UploadSlot {
    locks: UploadLocks,
    uuid: String,
    lock: Arc<Mutex<()>>,
}

impl UploadSlot {
    fn acquire(locks: &UploadLocks, uuid: &str) -> Self {
        let lock = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uuid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        Self {
            locks: Arc::clone(locks),
            uuid: uuid.to_string(),
            lock,
        }
    }
}

impl Drop for UploadSlot {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under the map lock, so a count of two
        // (map + this slot) means nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2
            && locks
                .get(&self.uuid)
                .is_some_and(|existing| Arc::ptr_eq(existing, &self.lock))
        {
            locks.remove(&self.uuid);
        }
    }
}

fn find_index(manifests: &[Manifest], uuid: &str) -> Result<usize, PoolError> {
    manifests
        .iter()
        .position(|m| m.uuid == uuid)
        .ok_or_else(|| PoolError::ResourceNotFound(format!("image {uuid} not found")))
}

fn ensure_upload_allowed(m: &Manifest) -> Result<(), PoolError> {
    if m.state != ManifestState::Unactivated || !m.files.is_empty() {
        return Err(PoolError::ImageAlreadyActivated);
    }
    Ok(())
}
