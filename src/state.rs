use std::sync::Arc;

use crate::services::{disk_store::DiskObjectStore, file_service::FileService};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    /// The concrete backend, for readiness probes and signed downloads.
    pub disk: Arc<DiskObjectStore>,
    pub env: String,
}

impl AppState {
    pub fn new(disk: Arc<DiskObjectStore>, env: impl Into<String>) -> Self {
        Self {
            files: FileService::new(disk.clone()),
            disk,
            env: env.into(),
        }
    }
}
