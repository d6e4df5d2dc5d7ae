//! Manifest record types.
//!
//! A manifest describes one image: identity, ownership, lifecycle state and
//! the (at most one) file attached to it. These types carry no behaviour
//! beyond construction and string conversions; the lifecycle rules live in
//! [`crate::pool`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Schema version written to every manifest's `v` field.
pub const MANIFEST_VERSION: u32 = 2;

/// Lifecycle state of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestState {
    /// Created, possibly with a file, never activated.
    #[default]
    Unactivated,
    /// Published and listed by default.
    Active,
    /// Activated at some point, currently hidden.
    Disabled,
}

impl ManifestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestState::Unactivated => "unactivated",
            ManifestState::Active => "active",
            ManifestState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ManifestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unactivated" => Ok(ManifestState::Unactivated),
            "active" => Ok(ManifestState::Active),
            "disabled" => Ok(ManifestState::Disabled),
            other => Err(format!("unknown manifest state: {other}")),
        }
    }
}

/// Compression applied to an uploaded image file.
///
/// The registry only records it; blobs are stored exactly as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Every supported kind, used when sweeping blob files for a uuid.
    pub const ALL: [Compression; 3] = [Compression::None, Compression::Gzip, Compression::Bzip2];

    /// Filesystem extension of the content file.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "raw",
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "bzip2" => Ok(Compression::Bzip2),
            other => Err(format!("unsupported compression: {other:?}")),
        }
    }
}

/// The single blob attached to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    /// Hex SHA-1 of the stored bytes; the content identifier.
    pub sha1: String,
    /// Number of bytes written.
    pub size: u64,
    pub compression: Compression,
}

/// Image manifest as stored and served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub v: u32,
    pub uuid: String,
    pub owner: String,
    pub name: String,
    pub version: String,
    pub state: ManifestState,
    /// Kept in step with `state`: true unless the image is active.
    pub disabled: bool,
    pub public: bool,
    /// RFC 3339 timestamp, empty until activation.
    pub published_at: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub os: String,
    pub files: Vec<ImageFile>,

    // Required when type == "zvol".
    pub nic_driver: String,
    pub disk_driver: String,
    pub cpu_type: String,
    pub image_size: i64,

    pub description: String,
}

/// Caller-supplied fields accepted when creating a manifest.
///
/// Anything else in a create request (uuid, state, files, ...) is owned by
/// the pool and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDraft {
    pub owner: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub os: String,
    pub nic_driver: String,
    pub disk_driver: String,
    pub cpu_type: String,
    pub image_size: i64,
    pub description: String,
}

impl Manifest {
    /// Build a freshly created, unactivated manifest.
    pub fn from_draft(draft: ManifestDraft, uuid: String) -> Self {
        Self {
            v: MANIFEST_VERSION,
            uuid,
            owner: draft.owner,
            name: draft.name,
            version: draft.version,
            state: ManifestState::Unactivated,
            disabled: true,
            public: true,
            published_at: String::new(),
            image_type: draft.image_type,
            os: draft.os,
            files: Vec::new(),
            nic_driver: draft.nic_driver,
            disk_driver: draft.disk_driver,
            cpu_type: draft.cpu_type,
            image_size: draft.image_size,
            description: draft.description,
        }
    }

    /// The uploaded file, if any.
    pub fn file(&self) -> Option<&ImageFile> {
        self.files.first()
    }
}
