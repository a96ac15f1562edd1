//! The storage port the file service depends on.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{
    bucket::BucketSummary,
    file::{ObjectReader, ObjectStream, PaginatedFiles},
};
use crate::services::storage_error::StorageResult;

/// Page size a backend uses when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Low-level object storage operations, implemented by each backend.
///
/// Implementations must be safe to share across concurrent uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return the object's public locator.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ObjectReader,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    /// Open an object for reading. Missing objects are `ObjectNotFound`.
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStream>;

    /// List one page of objects whose key starts with `prefix`.
    ///
    /// `token` is the opaque cursor from a previous page; `None` starts at
    /// the beginning.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
        limit: i32,
    ) -> StorageResult<PaginatedFiles>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Delete every object in the first listing page of `bucket`.
    async fn delete_all(&self, bucket: &str) -> StorageResult<()>;

    /// Whether `bucket` exists. Backend failures read as `false`.
    async fn bucket_exists(&self, bucket: &str) -> bool;

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>>;

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Build a time-limited URL granting read access to one object.
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String>;
}
