//! # imgreg-pool
//!
//! The authoritative image registry core: manifests, their lifecycle,
//! the blobs attached to them, and the durable on-disk collection.
//!
//! ## Layout
//!
//! - [`manifest`]: record types and lifecycle states (data only)
//! - [`filter`]: query predicates used for listing
//! - [`store`]: whole-collection persistence via atomic replace
//! - [`blob`]: single-pass blob ingestion (SHA-1 + MD5 + file write) and retrieval
//! - [`pool`]: the lock-guarded orchestrator enforcing the state machine
//!
//! ## Durability
//!
//! Every successful mutation is followed by a synchronous save of the
//! entire collection before the caller sees success. The collection file is
//! always replaced atomically, so a crash mid-write leaves the previous
//! snapshot intact.

pub mod blob;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod pool;
pub mod store;

pub use blob::{BlobError, BlobStore, IngestedBlob, StoredBlob};
pub use error::{ErrorClass, PoolError};
pub use filter::{matches_all, Filter, NameMatch};
pub use manifest::{
    Compression, ImageFile, Manifest, ManifestDraft, ManifestState, MANIFEST_VERSION,
};
pub use pool::{ImagePool, PoolConfig, SaveFailurePolicy};
pub use store::{ManifestStore, StoreError};
