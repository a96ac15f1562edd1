//! src/services/disk_store.rs
//!
//! DiskObjectStore: the bundled `ObjectStore` backend. Bucket and object
//! metadata live in SQLite; payloads live on local disk, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    bucket::{Bucket, BucketSummary},
    file::{FileSummary, ObjectReader, ObjectStream, PaginatedFiles},
    object::StoredObject,
};
use crate::services::{
    format::{format_bytes, normalized_extension},
    object_store::{DEFAULT_PAGE_SIZE, ObjectStore},
    signer::UrlSigner,
    storage_error::{StorageError, StorageResult},
};

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_LIST_LIMIT: i32 = 1000;
const COPY_BUF_LEN: usize = 64 * 1024;
const STORAGE_CLASS: &str = "STANDARD";

const MIGRATIONS: &str = include_str!("../../migrations/0001_init.sql");

const OBJECT_COLUMNS: &str = "id, bucket_id, key, content_type, size_bytes, etag, \
     storage_class, last_modified, is_deleted";

#[derive(Clone)]
pub struct DiskObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    signer: UrlSigner,
}

impl DiskObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            signer,
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Apply the embedded schema, one statement at a time.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = MIGRATIONS
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(())
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), to keep directories small.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        sqlx::query_as::<Sqlite, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
                other => StorageError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects \
             WHERE key = ? AND bucket_id = ? AND is_deleted = 0"
        ))
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    fn summarize(&self, bucket: &str, object: StoredObject) -> FileSummary {
        FileSummary {
            url: self.signer.object_url(bucket, &object.key),
            extension: normalized_extension(&object.key),
            human_readable_size: format_bytes(object.size_bytes),
            size: object.size_bytes,
            storage_class: object.storage_class,
            last_modified: object.last_modified,
            key: object.key,
        }
    }

    /// Walk up from `start` removing empty directories, stopping at `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Deletes the file at its path when dropped, unless disarmed first.
///
/// Covers every way a `put_object` future can end early: errors, timeouts,
/// client disconnects and aborted tasks.
struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed unfinished upload {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                "could not remove unfinished upload {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

/// Copy `body` into a fresh file at `path`, returning its size and MD5 etag.
async fn write_payload(path: &Path, body: &mut dyn ObjectReader) -> io::Result<(i64, String)> {
    let mut file = File::create(path).await?;
    let mut digest = Context::new();
    let mut size_bytes: i64 = 0;
    let mut buf = vec![0u8; COPY_BUF_LEN];

    loop {
        let n = body.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.consume(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        size_bytes += n as i64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn encode_continuation_token(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}

/// Tokens that fail to decode are used verbatim as the cursor key.
fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    /// Stream the payload to a temp file, fsync it, move it into place and
    /// upsert the metadata row (S3-like overwrite semantics).
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ObjectReader,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let mut tmp = RemoveOnDrop::new(parent.join(format!(".tmp-{}", Uuid::new_v4())));

        let (size_bytes, etag) = write_payload(tmp.path(), body).await?;

        fs::rename(tmp.path(), &file_path).await?;
        tmp.disarm();
        // A payload without a row is unreachable.
        let mut placed = RemoveOnDrop::new(file_path);

        sqlx::query(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes,
                etag, storage_class, last_modified, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                storage_class = excluded.storage_class,
                last_modified = excluded.last_modified,
                is_deleted = 0
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(STORAGE_CLASS)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        placed.disarm();

        debug!("stored {}/{} ({} bytes, etag {})", bucket, key, size_bytes, etag);
        Ok(self.signer.object_url(bucket, key))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStream> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok(Box::new(file))
    }

    /// Keys ascending; the cursor is the base64 of the last key handed out.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
        limit: i32,
    ) -> StorageResult<PaginatedFiles> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let limit = limit.clamp(1, MAX_LIST_LIMIT) as usize;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket_id = "
        ));
        builder.push_bind(bucket_rec.id);
        builder.push(" AND is_deleted = 0");

        if !prefix.is_empty() {
            builder.push(" AND substr(key, 1, length(");
            builder.push_bind(prefix.to_string());
            builder.push(")) = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(token) = token {
            builder.push(" AND key > ");
            builder.push_bind(decode_continuation_token(token));
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind((limit + 1) as i64);

        let mut rows: Vec<StoredObject> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next_token = String::new();
        if rows.len() > limit {
            rows.truncate(limit);
            if let Some(last) = rows.last() {
                next_token = encode_continuation_token(&last.key);
            }
        }

        let files = rows
            .into_iter()
            .map(|obj| self.summarize(&bucket_rec.name, obj))
            .collect();

        Ok(PaginatedFiles { files, next_token })
    }

    /// Soft-delete the row, then remove the payload and any emptied shard dirs.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let result = sqlx::query(
            "UPDATE objects SET is_deleted = 1 WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(bucket_rec.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(())
    }

    async fn delete_all(&self, bucket: &str) -> StorageResult<()> {
        let page = self
            .list_objects(bucket, "", None, DEFAULT_PAGE_SIZE)
            .await?;
        for file in &page.files {
            self.delete_object(bucket, &file.key).await?;
        }
        info!("emptied {} objects from bucket {}", page.files.len(), bucket);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> bool {
        match self.fetch_bucket(bucket).await {
            Ok(_) => true,
            Err(StorageError::BucketNotFound(_)) => false,
            Err(err) => {
                debug!("bucket lookup for {} failed, treating as missing: {}", bucket, err);
                false
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        fs::create_dir_all(self.bucket_root(bucket)).await?;

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(bucket)
            .bind(Utc::now())
            .execute(&*self.db)
            .await
        {
            Ok(_) => {
                info!("Created bucket {}", bucket);
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        let buckets = sqlx::query_as::<_, Bucket>(
            "SELECT id, name, created_at FROM buckets ORDER BY name ASC",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(buckets.into_iter().map(BucketSummary::from).collect())
    }

    /// Only empty buckets can be deleted; soft-deleted rows go with them.
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let live: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE bucket_id = ? AND is_deleted = 0")
                .bind(bucket_rec.id)
                .fetch_one(&*self.db)
                .await?;
        if live > 0 {
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM objects WHERE bucket_id = ?")
            .bind(bucket_rec.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(bucket_rec.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let bucket_path = self.bucket_root(bucket);
        if let Err(err) = fs::remove_dir_all(&bucket_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove bucket directory {} after delete: {}",
                    bucket_path.display(),
                    err
                );
            }
        }

        Ok(())
    }

    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String> {
        self.ensure_key_safe(key)?;
        Ok(self.signer.presign(bucket, key, ttl))
    }
}
