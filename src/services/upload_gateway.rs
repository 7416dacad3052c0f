//! Upload validation, persistence and listing on top of an [`ObjectStore`].
//!
//! Every accepted file becomes exactly one object whose key comes from
//! [`key_codec::encode`] and whose user metadata carries the uploader's
//! original filename. Listing reads that metadata back and only parses the
//! key when it is missing.

use bytes::Bytes;
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use std::{collections::HashMap, io, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::MAX_SIGNED_URL_TTL_SECS,
    models::file::{FileCandidate, FileEntry, UploadedFile},
    services::{
        key_codec,
        object_store::{ObjectStore, StoreError, StoreResult},
    },
};

/// Largest accepted file, in bytes.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Most file parts accepted in one upload request.
pub const MAX_FILES_PER_REQUEST: usize = 10;

/// User metadata key holding the percent-encoded original filename.
pub const ORIGINAL_NAME_METADATA: &str = "original-name";

/// S3 caps all user metadata of one object, keys and values together, at
/// 2 KB.
const MAX_METADATA_BYTES: usize = 2048;

/// Concurrent metadata/signing lookups while building a listing.
const LISTING_CONCURRENCY: usize = 8;

const ALLOWED_EXTENSIONS: [&str; 11] = [
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg", ".pdf", ".txt", ".doc", ".docx",
];

const ALLOWED_MIME_TYPES: [&str; 11] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Why a file was refused before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("File too large. Maximum size is 10MB per file")]
    TooLarge { size: u64 },
    #[error("File name too long")]
    NameTooLong { length: usize },
    #[error(
        "Invalid file type `{extension}`. Only images (including SVG), PDF, TXT, DOC and DOCX files are allowed"
    )]
    DisallowedExtension { extension: String },
    #[error("Invalid file type. Declared media type `{content_type}` is not allowed")]
    DisallowedMimeType { content_type: String },
}

impl Rejection {
    /// Short machine-readable tag for the `error` field of JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::TooLarge { .. } => "file_too_large",
            Rejection::NameTooLong { .. } => "name_too_long",
            Rejection::DisallowedExtension { .. } => "disallowed_extension",
            Rejection::DisallowedMimeType { .. } => "disallowed_mime_type",
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Check size, name length, extension and declared MIME type. All of them
/// must pass.
pub fn validate(file: &FileCandidate) -> Result<(), Rejection> {
    if file.size > MAX_FILE_SIZE {
        return Err(Rejection::TooLarge { size: file.size });
    }

    if !name_fits_metadata(&file.original_name) {
        return Err(Rejection::NameTooLong {
            length: file.original_name.len(),
        });
    }

    let extension = key_codec::extension(&file.original_name);
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        let extension = if extension.is_empty() {
            "(none)".to_string()
        } else {
            extension
        };
        return Err(Rejection::DisallowedExtension { extension });
    }

    let mime = normalize_mime(&file.content_type);
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(Rejection::DisallowedMimeType {
            content_type: file.content_type.clone(),
        });
    }

    Ok(())
}

/// Whether the percent-encoded name fits in the object's user metadata.
fn name_fits_metadata(name: &str) -> bool {
    ORIGINAL_NAME_METADATA.len() + urlencoding::encode(name).len() <= MAX_METADATA_BYTES
}

/// Lowercased essence of a MIME type, parameters removed.
fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A stored object on its way back to a client.
pub struct Download {
    pub file_name: String,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, io::Result<Bytes>>,
}

/// Upload gateway bound to one object store.
#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ObjectStore>,
    url_ttl: Duration,
    list_max_keys: usize,
}

impl FileService {
    /// `url_ttl` is capped at one hour.
    pub fn new(store: Arc<dyn ObjectStore>, url_ttl: Duration, list_max_keys: usize) -> Self {
        Self {
            store,
            url_ttl: url_ttl.min(Duration::from_secs(MAX_SIGNED_URL_TTL_SECS)),
            list_max_keys: list_max_keys.max(1),
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Validate one file and, when accepted, persist it under a fresh key.
    pub async fn accept(
        &self,
        original_name: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<UploadedFile, UploadError> {
        let candidate = FileCandidate {
            original_name: original_name.to_string(),
            size: body.len() as u64,
            content_type: content_type.to_string(),
        };
        validate(&candidate)?;

        let key = key_codec::encode(original_name);
        let metadata = HashMap::from([(
            ORIGINAL_NAME_METADATA.to_string(),
            urlencoding::encode(original_name).into_owned(),
        )]);
        self.store.put(&key, body, content_type, metadata).await?;
        let url = self.store.signed_read_url(&key, self.url_ttl).await?;

        info!(key = %key, original_name, size = candidate.size, "file uploaded");

        Ok(UploadedFile {
            original_name: candidate.original_name,
            location: self.store.location(&key),
            bucket: self.store.bucket().to_string(),
            filename: key,
            size: candidate.size,
            mimetype: candidate.content_type,
            url,
        })
    }

    /// Every enumerated object with its display name and a signed read URL,
    /// in store order.
    pub async fn list(&self) -> StoreResult<Vec<FileEntry>> {
        let objects = self.store.list(self.list_max_keys).await?;
        debug!(count = objects.len(), "building file listing");

        stream::iter(objects)
            .map(|object| async move {
                let original_name = self.original_name(&object.key).await;
                let url = self.store.signed_read_url(&object.key, self.url_ttl).await?;
                Ok::<_, StoreError>(FileEntry {
                    filename: object.key,
                    original_name,
                    size: object.size,
                    upload_date: object.last_modified,
                    url,
                })
            })
            .buffered(LISTING_CONCURRENCY)
            .try_collect()
            .await
    }

    /// Open the object stored under exactly `key`.
    pub async fn download(&self, key: &str) -> StoreResult<Download> {
        let object = self.store.get(key).await?;
        let file_name = original_name_from(&object.metadata).unwrap_or_else(|| key.to_string());
        Ok(Download {
            file_name,
            content_type: object
                .content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or_else(|| "application/octet-stream".into()),
            content_length: object.content_length,
            stream: object.stream,
        })
    }

    async fn original_name(&self, key: &str) -> String {
        match self.store.metadata(key).await {
            Ok(metadata) => {
                original_name_from(&metadata).unwrap_or_else(|| key_codec::decode(key))
            }
            Err(err) => {
                debug!(key, error = %err, "metadata unavailable, decoding name from key");
                key_codec::decode(key)
            }
        }
    }
}

fn original_name_from(metadata: &HashMap<String, String>) -> Option<String> {
    let raw = metadata.get(ORIGINAL_NAME_METADATA)?;
    let name = urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.clone());
    (!name.is_empty()).then_some(name)
}
