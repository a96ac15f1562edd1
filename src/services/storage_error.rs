//! Error type shared by the file service and every `ObjectStore` backend.

use std::io;
use thiserror::Error;

/// Coarse classification the HTTP layer maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    SecurityRejection,
    Conflict,
    NotFound,
    Timeout,
    Unexpected,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket name is required")]
    BucketNameRequired,
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },
    #[error("file key is required")]
    KeyRequired,
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("no files provided")]
    NoFiles,
    #[error("file type not allowed or malicious content detected")]
    InvalidFileType,
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("the operation timed out")]
    Timeout,
    #[error("the operation was cancelled")]
    Cancelled,
    #[error("{op} failed: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: Box<StorageError>,
    },
    #[error("failed to {action}: {source}")]
    Stream {
        action: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Wrap a backend failure with the operation it interrupted.
    pub fn during(self, op: &'static str) -> Self {
        StorageError::Backend {
            op,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::BucketNameRequired
            | StorageError::InvalidBucketName { .. }
            | StorageError::KeyRequired
            | StorageError::InvalidObjectKey
            | StorageError::NoFiles => ErrorKind::Validation,
            StorageError::InvalidFileType => ErrorKind::SecurityRejection,
            StorageError::BucketAlreadyExists(_) | StorageError::BucketNotEmpty(_) => {
                ErrorKind::Conflict
            }
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                ErrorKind::NotFound
            }
            StorageError::Timeout => ErrorKind::Timeout,
            StorageError::Backend { source, .. } => source.kind(),
            StorageError::Cancelled
            | StorageError::Stream { .. }
            | StorageError::Internal(_)
            | StorageError::Sqlx(_)
            | StorageError::Io(_) => ErrorKind::Unexpected,
        }
    }
}
