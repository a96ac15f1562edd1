//! Data models for the bucket gateway.
//!
//! `bucket` and `object` are the rows the local disk backend keeps in SQLite
//! (`sqlx::FromRow`). `file` holds the types the file service hands upward and
//! which the HTTP layer serializes as JSON via `serde`.

pub mod bucket;
pub mod file;
pub mod object;
