//! Blob storage for image files.
//!
//! Each image has at most one content file, `{uuid}.{ext}`, plus a sibling
//! `{uuid}.md5` holding the raw MD5 digest of the content. Ingestion reads
//! the upload exactly once, feeding every chunk to a SHA-1 hasher, an MD5
//! context and the content file.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{stream, StreamExt};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::manifest::{Compression, ImageFile};

/// Read chunk size when streaming a stored blob back out.
const READ_CHUNK_SIZE: usize = 64 * 1024;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors from blob operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Reading the upload or writing it to disk failed mid-stream.
    #[error("upload failed: {0}")]
    Upload(#[source] BoxError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Digests and size of a freshly ingested blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedBlob {
    /// Lowercase hex SHA-1.
    pub sha1: String,
    /// Raw MD5 digest, as written to the checksum file.
    pub md5: [u8; 16],
    pub size: u64,
}

/// A stored blob opened for reading.
#[derive(Debug)]
pub struct StoredBlob {
    /// Raw MD5 bytes from the checksum file.
    pub checksum: Vec<u8>,
    /// Size recorded in the manifest; not re-read from the filesystem.
    pub size: u64,
    pub file: File,
}

impl StoredBlob {
    /// Stream the content lazily in fixed-size chunks.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::try_unfold(self.file, |mut file| async move {
            let mut buf = BytesMut::zeroed(READ_CHUNK_SIZE);
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, io::Error>(None);
            }
            buf.truncate(n);
            Ok(Some((buf.freeze(), file)))
        })
    }
}

/// Filesystem-backed blob store rooted at one directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the content file for an image.
    pub fn content_path(&self, uuid: &str, compression: Compression) -> PathBuf {
        self.dir.join(format!("{}.{}", uuid, compression.extension()))
    }

    /// Path of the MD5 checksum file for an image.
    pub fn checksum_path(&self, uuid: &str) -> PathBuf {
        self.dir.join(format!("{uuid}.md5"))
    }

    /// Stream an upload to disk, computing SHA-1 and MD5 in the same pass.
    ///
    /// A partially written content file is left behind on failure; it is
    /// not referenced by any manifest.
    pub async fn ingest<S, E>(
        &self,
        uuid: &str,
        compression: Compression,
        body: S,
    ) -> Result<IngestedBlob, BlobError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        fs::create_dir_all(&self.dir).await?;

        let content_path = self.content_path(uuid, compression);
        let mut file = File::create(&content_path).await?;

        debug!(uuid = %uuid, path = %content_path.display(), "Receiving blob");

        let mut sha1 = Sha1::new();
        let mut md5 = md5::Context::new();
        let mut size = 0u64;

        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| BlobError::Upload(e.into()))?;
            sha1.update(&chunk);
            md5.consume(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| BlobError::Upload(Box::new(e)))?;
            size += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| BlobError::Upload(Box::new(e)))?;
        file.sync_all()
            .await
            .map_err(|e| BlobError::Upload(Box::new(e)))?;
        drop(file);

        let md5 = md5.compute().0;
        fs::write(self.checksum_path(uuid), md5).await?;

        let sha1 = hex::encode(sha1.finalize());

        info!(uuid = %uuid, sha1 = %sha1, size = size, "Blob stored");

        Ok(IngestedBlob { sha1, md5, size })
    }

    /// Open the blob described by `file` for streaming.
    pub async fn open(&self, uuid: &str, file: &ImageFile) -> Result<StoredBlob, BlobError> {
        let checksum = fs::read(self.checksum_path(uuid)).await?;
        let content = File::open(self.content_path(uuid, file.compression)).await?;

        Ok(StoredBlob {
            checksum,
            size: file.size,
            file: content,
        })
    }

    /// Remove the checksum file and any content file for `uuid`.
    ///
    /// Missing files are not an error.
    pub async fn remove(&self, uuid: &str) -> io::Result<()> {
        let mut paths = vec![self.checksum_path(uuid)];
        paths.extend(Compression::ALL.iter().map(|c| self.content_path(uuid, *c)));

        for path in paths {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed blob file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
