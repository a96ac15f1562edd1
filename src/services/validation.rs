//! Input checks that run before any backend call.

use crate::services::storage_error::{StorageError, StorageResult};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::models::file::ObjectReader;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Number of leading bytes inspected when sniffing content.
const SNIFF_LEN: u64 = 512;

pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

/// Validate a bucket name against S3-style DNS naming rules.
///
/// The candidate is trimmed and lower-cased first; the normalized name is
/// returned so callers forward exactly what was validated.
pub fn validate_bucket_name(bucket: &str) -> StorageResult<String> {
    let name = bucket.trim().to_lowercase();
    if name.is_empty() {
        return Err(StorageError::BucketNameRequired);
    }

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(StorageError::InvalidBucketName {
            name,
            reason: "length must be between 3 and 63",
        });
    }

    let edge_ok = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let starts_ok = name.chars().next().is_some_and(edge_ok);
    let ends_ok = name.chars().last().is_some_and(edge_ok);
    let body_ok = name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'));
    if !(starts_ok && ends_ok && body_ok) {
        return Err(StorageError::InvalidBucketName {
            name,
            reason: "invalid bucket name pattern",
        });
    }

    if name.contains("..") {
        return Err(StorageError::InvalidBucketName {
            name,
            reason: "cannot contain consecutive dots",
        });
    }

    Ok(name)
}

/// Sniff the head of `content` and reject anything outside the allow-list.
///
/// The stream is always rewound to offset 0 before the verdict is returned,
/// so an accepted stream can be uploaded from the start.
pub async fn validate_content(content: &mut dyn ObjectReader) -> StorageResult<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    (&mut *content)
        .take(SNIFF_LEN)
        .read_to_end(&mut head)
        .await
        .map_err(|source| StorageError::Stream {
            action: "read file header",
            source,
        })?;

    content
        .seek(SeekFrom::Start(0))
        .await
        .map_err(|source| StorageError::Stream {
            action: "reset file pointer",
            source,
        })?;

    let detected = detect_content_type(&head);
    match ALLOWED_CONTENT_TYPES.iter().find(|allowed| **allowed == detected) {
        Some(allowed) => Ok(*allowed),
        None => {
            tracing::warn!(detected, "rejected file type");
            Err(StorageError::InvalidFileType)
        }
    }
}

/// Classify bytes by their magic number, falling back to octet-stream.
fn detect_content_type(head: &[u8]) -> &'static str {
    infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream")
}
