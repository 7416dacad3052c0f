//! HTTP handlers for the upload UI, uploads, listing and downloads.
//! Storage concerns are delegated to `FileService`.

use crate::{
    errors::AppError,
    models::file::{FileListResponse, RejectedFile, UploadResponse},
    services::upload_gateway::{MAX_FILE_SIZE, MAX_FILES_PER_REQUEST, Rejection, UploadError},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, State,
        multipart::{Field, MultipartError},
    },
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use tracing::{error, warn};

/// Multipart field carrying uploaded files.
pub const FILES_FIELD: &str = "files";

/// Largest request body accepted by `POST /upload`: a full batch of
/// maximum-size files plus room for multipart framing.
pub const MAX_UPLOAD_BODY: usize = MAX_FILES_PER_REQUEST * MAX_FILE_SIZE as usize + 1024 * 1024;

const UPLOAD_PAGE: &str = include_str!("../../static/upload.html");
const UPLOAD_SCRIPT: &str = include_str!("../../static/upload.js");

/// `GET /upload`
pub async fn upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE)
}

/// `GET /upload/script.js`
pub async fn upload_script() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/javascript; charset=utf-8"),
        )],
        UPLOAD_SCRIPT,
    )
}

/// A file part read off the wire, not yet validated.
struct ReceivedFile {
    original_name: String,
    content_type: String,
    body: Result<Bytes, Rejection>,
}

/// `POST /upload`: multipart form, field `files`.
///
/// Each file is judged on its own: accepted files are stored even when
/// siblings are rejected. Answers 400 when nothing was sent, when more than
/// the allowed number of files was sent, or when every file was rejected.
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut received = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        // Browsers send an empty filename for an untouched file input.
        let Some(original_name) = field.file_name().filter(|n| !n.is_empty()) else {
            continue;
        };
        let original_name = original_name.to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = read_limited(field).await?;
        received.push(ReceivedFile {
            original_name,
            content_type,
            body,
        });
    }

    if received.is_empty() {
        return Err(AppError::bad_request("No files uploaded"));
    }
    if received.len() > MAX_FILES_PER_REQUEST {
        return Err(AppError::bad_request(format!(
            "Too many files. At most {} files can be uploaded at once",
            MAX_FILES_PER_REQUEST
        ))
        .with_error("too_many_files"));
    }

    let total = received.len();
    let mut files = Vec::new();
    let mut rejected = Vec::new();
    for file in received {
        let outcome = match file.body {
            Ok(body) => {
                state
                    .files
                    .accept(&file.original_name, &file.content_type, body)
                    .await
            }
            Err(rejection) => Err(UploadError::Rejected(rejection)),
        };

        match outcome {
            Ok(uploaded) => files.push(uploaded),
            Err(UploadError::Rejected(rejection)) => {
                warn!(
                    file = %file.original_name,
                    content_type = %file.content_type,
                    reason = rejection.kind(),
                    "upload rejected"
                );
                rejected.push(RejectedFile {
                    original_name: file.original_name,
                    reason: rejection.to_string(),
                });
            }
            Err(UploadError::Store(err)) => {
                error!(file = %file.original_name, error = %err, "upload failed");
                return Err(AppError::internal("Error uploading files").with_error(err));
            }
        }
    }

    if files.is_empty() {
        let message = match rejected.as_slice() {
            [only] => only.reason.clone(),
            _ => format!("All {} files were rejected", total),
        };
        let body = UploadResponse {
            success: false,
            message,
            error: Some("validation".into()),
            files,
            rejected,
        };
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let message = if rejected.is_empty() {
        format!("Successfully uploaded {} file(s)", files.len())
    } else {
        format!("Uploaded {} of {} files", files.len(), total)
    };
    let body = UploadResponse {
        success: true,
        message,
        error: None,
        files,
        rejected,
    };
    Ok(Json(body).into_response())
}

/// `GET /files`
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>, AppError> {
    let files = state.files.list().await.map_err(|err| {
        error!(error = %err, "listing files failed");
        AppError::internal("Error listing files").with_error(err)
    })?;
    Ok(Json(FileListResponse { files }))
}

/// `GET /download/{filename}`: stream the object as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let download = match state.files.download(&filename).await {
        Ok(download) => download,
        Err(err) => {
            error!(key = %filename, error = %err, "download failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error downloading file: {}", err),
            )
                .into_response();
        }
    };

    let mut response = Response::new(Body::from_stream(download.stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&download.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(length) = download.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&download.file_name))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    response
}

/// Buffer one file part, giving up as soon as it exceeds the size limit.
async fn read_limited(mut field: Field<'_>) -> Result<Result<Bytes, Rejection>, AppError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        let size = (buf.len() + chunk.len()) as u64;
        if size > MAX_FILE_SIZE {
            return Ok(Err(Rejection::TooLarge { size }));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Ok(buf.freeze()))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), "Invalid multipart upload").with_error(err.body_text())
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`.
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}
