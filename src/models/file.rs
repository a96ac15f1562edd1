//! Files travelling through the upload path and the listings handed back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncSeek};

/// A readable, seekable byte source. Content sniffing reads the head of the
/// stream and rewinds it before the backend consumes the whole thing.
pub trait ObjectReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> ObjectReader for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Stream returned by a backend download.
pub type ObjectStream = Box<dyn AsyncRead + Send + Unpin>;

/// A file submitted for upload.
///
/// The file service owns it for the duration of an upload and rewrites
/// `name` (to the generated key) and `url` (to the backend locator).
pub struct File {
    pub name: String,
    pub content: Box<dyn ObjectReader>,
    pub size: i64,
    pub content_type: Option<String>,
    pub url: Option<String>,
}

impl File {
    pub fn new(
        name: impl Into<String>,
        content: impl ObjectReader + 'static,
        size: i64,
        content_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content: Box::new(content),
            size,
            content_type,
            url: None,
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// One entry of a file listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileSummary {
    pub key: String,
    pub url: String,
    #[serde(rename = "size_bytes")]
    pub size: i64,
    #[serde(rename = "size_formatted")]
    pub human_readable_size: String,
    /// Lower-case, with a leading dot, or empty.
    pub extension: String,
    pub storage_class: String,
    pub last_modified: DateTime<Utc>,
}

/// A single page of a listing plus the opaque cursor for the next one.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PaginatedFiles {
    pub files: Vec<FileSummary>,
    /// Empty when there are no further pages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub next_token: String,
}
