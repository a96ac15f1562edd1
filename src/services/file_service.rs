//! src/services/file_service.rs
//!
//! FileService: the orchestration layer between the HTTP handlers and an
//! `ObjectStore` backend. It owns every check that must happen before the
//! backend is touched (bucket names, content sniffing, required keys), renames
//! uploads to time-ordered ids, fans out multi-file uploads, and post-processes
//! listings and stats.

use std::{sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{
    bucket::{BucketStats, BucketSummary},
    file::{File, ObjectStream, PaginatedFiles},
};
use crate::services::{
    format::{file_extension, format_bytes},
    object_store::{DEFAULT_PAGE_SIZE, ObjectStore},
    storage_error::{StorageError, StorageResult},
    validation::{validate_bucket_name, validate_content},
};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(5);
const PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_LIST_LIMIT: i32 = 10;

/// Cheap to clone; every clone shares the same backend.
#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ObjectStore>,
}

impl FileService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Validate, rename and persist a single file, returning its locator.
    ///
    /// On success `file.name` holds the generated key and `file.url` the
    /// locator returned by the backend.
    pub async fn upload_file(&self, bucket: &str, file: &mut File) -> StorageResult<String> {
        self.upload_cancellable(bucket, file, &CancellationToken::new())
            .await
    }

    /// Upload every file concurrently; all of them succeed or the first error
    /// is returned.
    ///
    /// The first failure cancels the siblings that have not reached the backend
    /// yet. Objects already written by other tasks are left in place. On success
    /// the locators are in input order.
    pub async fn upload_multiple_files(
        &self,
        bucket: &str,
        files: Vec<File>,
    ) -> StorageResult<Vec<String>> {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut urls: Vec<Option<String>> = vec![None; files.len()];

        for (index, mut file) in files.into_iter().enumerate() {
            let service = self.clone();
            let bucket = bucket.to_string();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = service.upload_cancellable(&bucket, &mut file, &cancel).await;
                (index, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|err| StorageError::Internal(format!("upload task failed: {err}")));
            match outcome {
                Ok((index, Ok(url))) => urls[index] = Some(url),
                Ok((_, Err(err))) | Err(err) => {
                    if first_error.is_none() {
                        cancel.cancel();
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        urls.into_iter()
            .map(|url| url.ok_or_else(|| StorageError::Internal("upload result missing".into())))
            .collect()
    }

    async fn upload_cancellable(
        &self,
        bucket: &str,
        file: &mut File,
        cancel: &CancellationToken,
    ) -> StorageResult<String> {
        tokio::time::timeout(UPLOAD_TIMEOUT, self.upload_steps(bucket, file, cancel))
            .await
            .map_err(|_| StorageError::Timeout)?
    }

    async fn upload_steps(
        &self,
        bucket: &str,
        file: &mut File,
        cancel: &CancellationToken,
    ) -> StorageResult<String> {
        let bucket = validate_bucket_name(bucket)?;

        if let Err(err) = validate_content(file.content.as_mut()).await {
            error!("security validation failed for {}: {}", file.name, err);
            return Err(err);
        }

        file.name = object_key(&file.name);

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let url = self
            .store
            .put_object(
                &bucket,
                &file.name,
                file.content.as_mut(),
                file.content_type.as_deref(),
            )
            .await
            .map_err(|err| {
                error!("repository upload to bucket {} failed: {}", bucket, err);
                err.during("upload")
            })?;

        info!(url = %url, "file uploaded successfully");
        file.url = Some(url.clone());
        Ok(url)
    }

    /// Presigned GET URL valid for 15 minutes.
    pub async fn download_url(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let bucket = validate_bucket_name(bucket)?;
        require_key(key)?;
        self.store.presign(&bucket, key, PRESIGN_TTL).await
    }

    pub async fn download_file(&self, bucket: &str, key: &str) -> StorageResult<ObjectStream> {
        let bucket = validate_bucket_name(bucket)?;
        require_key(key)?;
        self.store.get_object(&bucket, key).await
    }

    /// One page of the bucket listing, optionally narrowed to one extension.
    ///
    /// Filtering is applied to the fetched page only, so a filtered page can
    /// be shorter than `limit` while later pages still hold matches.
    pub async fn list_files(
        &self,
        bucket: &str,
        extension: &str,
        token: &str,
        limit: i64,
    ) -> StorageResult<PaginatedFiles> {
        let bucket = validate_bucket_name(bucket)?;
        let limit = normalize_limit(limit);
        let token = (!token.is_empty()).then_some(token);

        let mut page = self.store.list_objects(&bucket, "", token, limit).await?;

        if !extension.is_empty() {
            let mut target = extension.to_lowercase();
            if !target.starts_with('.') {
                target.insert(0, '.');
            }
            page.files.retain(|f| f.extension.to_lowercase() == target);
        }

        Ok(page)
    }

    pub async fn delete_file(&self, bucket: &str, key: &str) -> StorageResult<()> {
        require_key(key)?;
        let bucket = validate_bucket_name(bucket)?;

        tokio::time::timeout(DELETE_TIMEOUT, self.store.delete_object(&bucket, key))
            .await
            .map_err(|_| StorageError::Timeout)?
    }

    /// Count and size of the objects in the first listing page of `bucket`.
    ///
    /// Buckets holding more than one backend page are undercounted.
    pub async fn bucket_stats(&self, bucket: &str) -> StorageResult<BucketStats> {
        let bucket = validate_bucket_name(bucket)?;
        let page = self
            .store
            .list_objects(&bucket, "", None, DEFAULT_PAGE_SIZE)
            .await?;

        let total_size_bytes: i64 = page.files.iter().map(|f| f.size).sum();
        Ok(BucketStats {
            bucket_name: bucket,
            total_files: page.files.len(),
            total_size_bytes,
            total_size_formatted: format_bytes(total_size_bytes),
        })
    }

    pub async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        let bucket = validate_bucket_name(bucket)?;
        if self.store.bucket_exists(&bucket).await {
            return Err(StorageError::BucketAlreadyExists(bucket));
        }
        self.store.create_bucket(&bucket).await
    }

    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        self.store.list_buckets().await
    }

    pub async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let bucket = validate_bucket_name(bucket)?;
        self.store.delete_bucket(&bucket).await
    }

    pub async fn empty_bucket(&self, bucket: &str) -> StorageResult<()> {
        let bucket = validate_bucket_name(bucket)?;
        self.store.delete_all(&bucket).await
    }
}

/// Time-ordered key for an upload: a fresh UUIDv7 plus the original extension.
fn object_key(original_name: &str) -> String {
    format!("{}{}", Uuid::now_v7(), file_extension(original_name))
}

fn normalize_limit(limit: i64) -> i32 {
    if limit <= 0 {
        DEFAULT_LIST_LIMIT
    } else {
        i32::try_from(limit).unwrap_or(i32::MAX)
    }
}

fn require_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::KeyRequired);
    }
    Ok(())
}
