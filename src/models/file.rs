//! Client-facing shapes of uploaded files.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One file part of an upload request, as judged by validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCandidate {
    /// Filename exactly as the client sent it.
    pub original_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Declared MIME type (untrusted).
    pub content_type: String,
}

/// A file accepted and persisted by an upload request.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    /// Storage key.
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
    pub location: String,
    pub bucket: String,
    /// Signed read URL.
    pub url: String,
}

/// A file refused by validation.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFile {
    pub original_name: String,
    pub reason: String,
}

/// One entry of the `/files` listing.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Storage key.
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub upload_date: Option<DateTime<Utc>>,
    /// Signed read URL.
    pub url: String,
}

#[derive(Serialize, Debug)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
}

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub files: Vec<UploadedFile>,
    pub rejected: Vec<RejectedFile>,
}
