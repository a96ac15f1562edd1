//! Represents a logical bucket, a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A bucket row as persisted by the local disk backend.
#[derive(Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal identifier, referenced by object rows.
    pub id: Uuid,

    /// Globally unique bucket name (already validated against DNS naming rules).
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}

/// Read-only projection of backend bucket metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BucketSummary {
    pub name: String,
    #[serde(rename = "creation_date")]
    pub created_at: DateTime<Utc>,
}

impl From<Bucket> for BucketSummary {
    fn from(bucket: Bucket) -> Self {
        Self {
            name: bucket.name,
            created_at: bucket.created_at,
        }
    }
}

/// Usage totals for a single bucket, computed fresh on every request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BucketStats {
    pub bucket_name: String,
    pub total_files: usize,
    pub total_size_bytes: i64,
    pub total_size_formatted: String,
}
