//! Shared, read-only state handed to every handler.

use crate::services::upload_gateway::FileService;
use std::sync::Arc;

/// Identity reported by `GET /`, fixed before the listener is bound.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub env: String,
}

#[derive(Clone)]
pub struct AppState {
    pub info: Arc<ServiceInfo>,
    pub files: FileService,
}

impl AppState {
    pub fn new(info: ServiceInfo, files: FileService) -> Self {
        Self {
            info: Arc::new(info),
            files,
        }
    }
}
