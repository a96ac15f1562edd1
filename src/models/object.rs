//! Represents an object row stored by the local disk backend.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single stored blob. The payload itself lives on disk.
#[derive(Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key within the bucket.
    pub key: String,

    /// Content type supplied at upload time, if any.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: String,

    /// Storage class (always STANDARD for the disk backend).
    pub storage_class: String,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,

    /// Soft-delete marker.
    pub is_deleted: bool,
}
