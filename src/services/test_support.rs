//! In-memory `ObjectStore` spy for service tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, ReadBuf};
use tokio::time::Sleep;

use crate::models::{
    bucket::BucketSummary,
    file::{File, ObjectReader, ObjectStream, PaginatedFiles},
};
use crate::services::object_store::ObjectStore;
use crate::services::storage_error::{StorageError, StorageResult};

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// A PNG-looking file whose payload after the magic bytes is `tag`.
pub fn png_file(name: &str, tag: &str) -> File {
    let mut body = PNG_MAGIC.to_vec();
    body.extend_from_slice(tag.as_bytes());
    let size = body.len() as i64;
    File::new(name, Cursor::new(body), size, Some("image/png".into()))
}

/// Like `png_file`, but the first read waits `delay`, so the upload sits in
/// content sniffing before it can reach the backend.
pub fn slow_png_file(name: &str, tag: &str, delay: Duration) -> File {
    let mut body = PNG_MAGIC.to_vec();
    body.extend_from_slice(tag.as_bytes());
    let size = body.len() as i64;
    let reader = SlowReader {
        inner: Cursor::new(body),
        delay: Some(Box::pin(tokio::time::sleep(delay))),
    };
    File::new(name, reader, size, Some("image/png".into()))
}

pub struct SlowReader {
    inner: Cursor<Vec<u8>>,
    delay: Option<Pin<Box<Sleep>>>,
}

impl AsyncRead for SlowReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(delay) = self.delay.as_mut() {
            ready!(delay.as_mut().poll(cx));
            self.delay = None;
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for SlowReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

pub fn text_file(name: &str) -> File {
    let body = b"hello, definitely not an image".to_vec();
    let size = body.len() as i64;
    File::new(name, Cursor::new(body), size, Some("image/png".into()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    pub token: Option<String>,
    pub limit: i32,
}

/// Records every call; puts store the payload and answer `mem://<bucket>/<tag>`.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<String>>,
    put_keys: Mutex<Vec<String>>,
    list_requests: Mutex<Vec<ListRequest>>,
    page: Mutex<PaginatedFiles>,
    existing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: PaginatedFiles) -> Self {
        *self.page.lock().unwrap() = page;
        self
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.existing.lock().unwrap().insert(bucket.to_string());
        self
    }

    /// Delay the put of the file tagged `tag`, or the delete of key `tag`.
    pub fn delay(self, tag: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(tag.to_string(), delay);
        self
    }

    /// Make the put of the file tagged `tag` fail.
    pub fn fail(self, tag: &str) -> Self {
        self.failing.lock().unwrap().insert(tag.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.put_keys.lock().unwrap().clone()
    }

    pub fn list_requests(&self) -> Vec<ListRequest> {
        self.list_requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ObjectReader,
        _content_type: Option<&str>,
    ) -> StorageResult<String> {
        self.record(format!("put {bucket}"));
        self.put_keys.lock().unwrap().push(key.to_string());

        let mut payload = Vec::new();
        body.read_to_end(&mut payload).await?;
        let tag = String::from_utf8_lossy(payload.strip_prefix(PNG_MAGIC).unwrap_or(&payload[..]))
            .into_owned();

        let delay = self.delays.lock().unwrap().get(&tag).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&tag) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "backend rejected {tag}"
            ))));
        }

        Ok(format!("mem://{bucket}/{tag}"))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStream> {
        self.record(format!("get {bucket}/{key}"));
        Err(StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
        limit: i32,
    ) -> StorageResult<PaginatedFiles> {
        self.record(format!("list {bucket}"));
        self.list_requests.lock().unwrap().push(ListRequest {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            token: token.map(str::to_string),
            limit,
        });
        Ok(self.page.lock().unwrap().clone())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.record(format!("delete {bucket}/{key}"));
        let delay = self.delays.lock().unwrap().get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn delete_all(&self, bucket: &str) -> StorageResult<()> {
        self.record(format!("delete_all {bucket}"));
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> bool {
        self.record(format!("exists {bucket}"));
        self.existing.lock().unwrap().contains(bucket)
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.record(format!("create {bucket}"));
        self.existing.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        self.record("list_buckets".to_string());
        Ok(Vec::new())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.record(format!("delete_bucket {bucket}"));
        Ok(())
    }

    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String> {
        self.record(format!("presign {bucket}/{key}"));
        Ok(format!("mem://{bucket}/{key}?ttl={}", ttl.as_secs()))
    }
}
