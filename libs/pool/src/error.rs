//! Error taxonomy for image pool operations.

use thiserror::Error;

use crate::blob::{BlobError, BoxError};
use crate::store::StoreError;

/// Coarse class of an error, used by adapters to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Client,
    Unavailable,
    Server,
}

/// Errors returned by [`crate::ImagePool`] operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No manifest (or no file) for the given uuid.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A caller-supplied parameter was missing or invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Re-activation, or an upload against an image that already has its file.
    #[error("image is already activated")]
    ImageAlreadyActivated,

    /// Activation attempted before a file was uploaded.
    #[error("image must have a file to be activated")]
    NoActivationNoFile,

    /// Enabling an image that was never activated.
    #[error("image must be activated before it can be enabled")]
    NotActivated,

    /// The upload stream failed while being written.
    #[error("upload failed: {0}")]
    Upload(#[source] BoxError),

    /// Persisting the manifest collection failed.
    #[error("manifest store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PoolError::ResourceNotFound(_) => ErrorClass::NotFound,
            PoolError::InvalidParameter(_)
            | PoolError::ImageAlreadyActivated
            | PoolError::NoActivationNoFile
            | PoolError::Upload(_) => ErrorClass::Client,
            PoolError::NotActivated => ErrorClass::Unavailable,
            PoolError::Store(_) | PoolError::Io(_) => ErrorClass::Server,
        }
    }

    /// Machine-readable error code exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::ResourceNotFound(_) => "ResourceNotFound",
            PoolError::InvalidParameter(_) => "InvalidParameter",
            PoolError::ImageAlreadyActivated => "ImageAlreadyActivated",
            PoolError::NoActivationNoFile => "NoActivationNoFile",
            PoolError::NotActivated => "ServiceUnavailableError",
            PoolError::Upload(_) => "Upload",
            PoolError::Store(_) | PoolError::Io(_) => "InternalError",
        }
    }

    /// Fixed client-facing description for the error code.
    pub fn description(&self) -> &'static str {
        match self {
            PoolError::ResourceNotFound(_) => "Not Found",
            PoolError::InvalidParameter(_) => "Given parameter was invalid.",
            PoolError::ImageAlreadyActivated => "Image is already activated.",
            PoolError::NoActivationNoFile => "Image must have a file to be activated.",
            PoolError::NotActivated => "Service Unavailable",
            PoolError::Upload(_) => "There was a problem with the upload.",
            PoolError::Store(_) | PoolError::Io(_) => "Internal Server Error",
        }
    }
}

impl From<BlobError> for PoolError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Upload(source) => PoolError::Upload(source),
            BlobError::Io(source) => PoolError::Io(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_and_codes() {
        let cases = [
            (PoolError::ResourceNotFound("x".into()), ErrorClass::NotFound, "ResourceNotFound"),
            (PoolError::InvalidParameter("x".into()), ErrorClass::Client, "InvalidParameter"),
            (PoolError::ImageAlreadyActivated, ErrorClass::Client, "ImageAlreadyActivated"),
            (PoolError::NoActivationNoFile, ErrorClass::Client, "NoActivationNoFile"),
            (PoolError::NotActivated, ErrorClass::Unavailable, "ServiceUnavailableError"),
            (
                PoolError::Io(std::io::Error::other("disk")),
                ErrorClass::Server,
                "InternalError",
            ),
        ];

        for (err, class, code) in cases {
            assert_eq!(err.class(), class);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_blob_error_conversion() {
        let upload: PoolError = BlobError::Upload("reset".into()).into();
        assert!(matches!(upload, PoolError::Upload(_)));
        assert_eq!(upload.class(), ErrorClass::Client);

        let io: PoolError = BlobError::Io(std::io::Error::other("full")).into();
        assert_eq!(io.code(), "InternalError");
    }
}
