//! Object storage seam.
//!
//! `ObjectStore` is the narrow surface the upload gateway needs from a
//! bucket: put, enumerate, read metadata, sign a read URL, stream an object.
//! `S3ObjectStore` implements it with the AWS SDK; tests use an in-memory
//! implementation.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{
    Client,
    config::Builder as S3ConfigBuilder,
    error::{DisplayErrorContext, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};
use std::{collections::HashMap, io, time::Duration};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{config::AppConfig, services::key_codec::MAX_KEY_LEN};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error("failed to sign url for `{key}`: {reason}")]
    Signing { key: String, reason: String },
    #[error("object store request failed: {0}")]
    Upstream(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One entry of a bucket enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A fetched object ready to be streamed out.
pub struct ObjectBody {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub metadata: HashMap<String, String>,
    pub stream: BoxStream<'static, io::Result<Bytes>>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket objects live in.
    fn bucket(&self) -> &str;

    /// Non-signed address of an object, reported back to uploaders.
    fn location(&self, key: &str) -> String;

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<()>;

    /// Enumerate up to `max_keys` objects in store order.
    async fn list(&self, max_keys: usize) -> StoreResult<Vec<ObjectSummary>>;

    /// User metadata recorded with the object at upload time.
    async fn metadata(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StoreResult<String>;

    async fn get(&self, key: &str) -> StoreResult<ObjectBody>;

    /// Cheap reachability check used by readiness.
    async fn probe(&self) -> StoreResult<()>;
}

/// S3-backed store bound to a single bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    /// Build a client on top of the shared AWS configuration, honouring an
    /// optional custom endpoint.
    pub fn from_config(shared: &SdkConfig, cfg: &AppConfig) -> Self {
        let mut builder = S3ConfigBuilder::from(shared);
        if let Some(endpoint) = &cfg.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
            endpoint: cfg.s3_endpoint.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &str) -> String {
        let path = encode_key_path(key);
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                path
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, path
            ),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<()> {
        ensure_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(upstream)?;
        debug!(key, bucket = %self.bucket, "stored object");
        Ok(())
    }

    async fn list(&self, max_keys: usize) -> StoreResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let remaining = max_keys.saturating_sub(objects.len());
            if remaining == 0 {
                break;
            }
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .max_keys(remaining.min(1000) as i32)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(upstream)?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())),
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        objects.truncate(max_keys);
        Ok(objects)
    }

    async fn metadata(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        ensure_key(key)?;
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    StoreError::NotFound(key.to_string())
                } else {
                    upstream(err)
                }
            })?;
        Ok(head.metadata().cloned().unwrap_or_default())
    }

    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        ensure_key(key)?;
        let signing_error = |reason: String| StoreError::Signing {
            key: key.to_string(),
            reason,
        };
        let presign =
            PresigningConfig::expires_in(ttl).map_err(|e| signing_error(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign)
            .await
            .map_err(|e| signing_error(DisplayErrorContext(e).to_string()))?;
        Ok(request.uri().to_string())
    }

    async fn get(&self, key: &str) -> StoreResult<ObjectBody> {
        ensure_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StoreError::NotFound(key.to_string())
                } else {
                    upstream(err)
                }
            })?;

        let content_type = output.content_type().map(str::to_string);
        let content_length = output.content_length().and_then(|len| u64::try_from(len).ok());
        let metadata = output.metadata().cloned().unwrap_or_default();
        let reader = output.body.into_async_read();

        Ok(ObjectBody {
            content_type,
            content_length,
            metadata,
            stream: ReaderStream::new(reader).boxed(),
        })
    }

    async fn probe(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(upstream)?;
        Ok(())
    }
}

/// Percent-encode every `/`-separated segment of a key for use in a URL path.
fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject keys that cannot name an object created by this service.
fn ensure_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.bytes().any(|b| b.is_ascii_control()) {
        return Err(StoreError::InvalidKey);
    }
    Ok(())
}

fn upstream<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StoreError::Upstream(DisplayErrorContext(err).to_string())
}
