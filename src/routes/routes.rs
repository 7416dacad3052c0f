//! Defines routes for the demo server.
//!
//! ## Structure
//! - **Service endpoints**
//!   - `GET  /healthz`     : liveness
//!   - `GET  /readyz`      : bucket reachability
//!   - `GET  /`            : name and environment label
//!   - `GET  /auto-deploy` : deployment smoke check
//!
//! - **File endpoints**
//!   - `GET  /upload`             : upload UI
//!   - `GET  /upload/script.js`   : upload UI script
//!   - `POST /upload`             : multipart upload (field `files`)
//!   - `GET  /files`              : listing with signed URLs
//!   - `GET  /download/{filename}`: stream an object as an attachment

use crate::{
    handlers::{
        file_handlers::{
            MAX_UPLOAD_BODY, download_file, list_files, upload_files, upload_page, upload_script,
        },
        health_handlers::{auto_deploy, healthz, readyz, service_info},
    },
    state::AppState,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::trace::TraceLayer;

/// Build and return the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // service endpoints
        .route("/", get(service_info))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/auto-deploy", get(auto_deploy))
        // file endpoints
        .route(
            "/upload",
            get(upload_page)
                .post(upload_files)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY)),
        )
        .route("/upload/script.js", get(upload_script))
        .route("/files", get(list_files))
        .route("/download/{filename}", get(download_file))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{
            object_store::memory::MemoryObjectStore,
            secret_store::{resolve_environment, stub::StubSecretStore},
            upload_gateway::{FileService, MAX_FILE_SIZE, ORIGINAL_NAME_METADATA},
        },
        state::ServiceInfo,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-DEMO-BOUNDARY";

    fn app_with(store: Arc<MemoryObjectStore>) -> Router {
        let files = FileService::new(store, Duration::from_secs(3600), 1000);
        let info = ServiceInfo {
            name: "apprunner-demo".into(),
            env: "test".into(),
        };
        routes().with_state(AppState::new(info, files))
    }

    /// Multipart body with one `files` part per `(name, content type, bytes)`.
    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, content_type, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> Response {
        app.oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn is_generated_key(key: &str, base: &str, ext: &str) -> bool {
        let Some(rest) = key
            .strip_prefix(&format!("{base}-"))
            .and_then(|r| r.strip_suffix(ext))
        else {
            return false;
        };
        match rest.split_once('-') {
            Some((a, b)) => {
                !a.is_empty()
                    && !b.is_empty()
                    && a.bytes().all(|c| c.is_ascii_digit())
                    && b.bytes().all(|c| c.is_ascii_digit())
            }
            None => false,
        }
    }

    #[tokio::test]
    async fn healthz_is_plain_ok() {
        let app = app_with(Arc::new(MemoryObjectStore::new()));
        let response = send(app, Request::get("/healthz").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 16).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn root_reports_name_and_env() {
        let app = app_with(Arc::new(MemoryObjectStore::new()));
        let response = send(app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["name"], "apprunner-demo");
        assert_eq!(body["env"], "test");
    }

    #[tokio::test]
    async fn root_uses_fallback_when_secret_store_is_down() {
        let mut cfg = crate::config::AppConfig::from_sources(Default::default(), |_| None).unwrap();
        cfg.secret_name = Some("demo/app".into());
        let secrets = StubSecretStore(Err("endpoint unreachable".into()));
        let env = resolve_environment(&cfg, Some(&secrets)).await;

        let files = FileService::new(
            Arc::new(MemoryObjectStore::new()),
            cfg.signed_url_ttl(),
            cfg.list_max_keys,
        );
        let app = routes().with_state(AppState::new(
            ServiceInfo {
                name: cfg.app_name.clone(),
                env,
            },
            files,
        ));

        let response = send(app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["env"], "development");
    }

    #[tokio::test]
    async fn readyz_reflects_bucket_reachability() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());
        let response = send(app.clone(), Request::get("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        store.set_offline(true);
        let response = send(app, Request::get("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["checks"]["bucket"]["ok"], false);
    }

    #[tokio::test]
    async fn upload_page_is_html() {
        let app = app_with(Arc::new(MemoryObjectStore::new()));
        let response = send(app, Request::get("/upload").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn upload_png_succeeds() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());
        let png = vec![0x89u8; 2 * 1024 * 1024];

        let response = send(
            app,
            upload_request(multipart_body(&[("diagram.png", "image/png", &png[..])])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        let key = files[0]["filename"].as_str().unwrap();
        assert!(is_generated_key(key, "diagram", ".png"), "{key}");
        assert_eq!(files[0]["originalName"], "diagram.png");
        assert_eq!(files[0]["size"], 2 * 1024 * 1024);
        assert_eq!(files[0]["mimetype"], "image/png");
        assert_eq!(files[0]["bucket"], "test-bucket");
        assert!(files[0]["url"].as_str().unwrap().contains(key));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn upload_exe_is_rejected_without_storing() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());

        let response = send(
            app,
            upload_request(multipart_body(&[(
                "installer.exe",
                "application/x-msdownload",
                b"MZ\x90\x00".as_slice(),
            )])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("Invalid file type"));
        assert_eq!(body["rejected"][0]["originalName"], "installer.exe");
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn mixed_batch_keeps_accepted_files() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());

        let response = send(
            app,
            upload_request(multipart_body(&[
                ("notes.txt", "text/plain", b"hello".as_slice()),
                ("script.sh", "text/x-sh", b"#!/bin/sh".as_slice()),
                ("fake.jpg", "application/octet-stream", b"\xff\xd8".as_slice()),
            ])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["files"].as_array().unwrap().len(), 1);
        assert_eq!(body["rejected"].as_array().unwrap().len(), 2);
        assert_eq!(body["message"], "Uploaded 1 of 3 files");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn long_filename_is_stored_alongside_siblings() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());
        let long_name = format!("{}.txt", "a".repeat(1010));

        let response = send(
            app,
            upload_request(multipart_body(&[
                (long_name.as_str(), "text/plain", b"long".as_slice()),
                ("after.txt", "text/plain", b"after".as_slice()),
            ])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Successfully uploaded 2 file(s)");
        assert_eq!(body["files"][0]["originalName"], long_name.as_str());
        let keys = store.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.len() <= 1024 && k.ends_with(".txt")));
        assert!(keys.iter().any(|k| is_generated_key(k, "after", ".txt")));
    }

    #[tokio::test]
    async fn overlong_filename_is_rejected_without_dropping_siblings() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());
        let huge_name = format!("{}.txt", "x y".repeat(700));

        let response = send(
            app,
            upload_request(multipart_body(&[
                (huge_name.as_str(), "text/plain", b"huge".as_slice()),
                ("after.txt", "text/plain", b"after".as_slice()),
            ])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Uploaded 1 of 2 files");
        assert_eq!(body["rejected"][0]["reason"], "File name too long");
        assert_eq!(store.len(), 1);
        assert!(is_generated_key(&store.keys()[0], "after", ".txt"));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());
        let big = vec![b'a'; MAX_FILE_SIZE as usize + 1];

        let response = send(
            app,
            upload_request(multipart_body(&[("big.txt", "text/plain", &big[..])])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().contains("too large"));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_bad_request() {
        let app = app_with(Arc::new(MemoryObjectStore::new()));
        let response = send(app, upload_request(multipart_body(&[]))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "No files uploaded");
    }

    #[tokio::test]
    async fn more_than_ten_files_is_bad_request() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store.clone());
        let names: Vec<String> = (0..11).map(|i| format!("f{i}.txt")).collect();
        let parts: Vec<(&str, &str, &[u8])> = names
            .iter()
            .map(|n| (n.as_str(), "text/plain", b"x".as_slice()))
            .collect();

        let response = send(app, upload_request(multipart_body(&parts))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn upload_store_failure_is_server_error() {
        let store = Arc::new(MemoryObjectStore::new());
        store.set_offline(true);
        let app = app_with(store);

        let response = send(
            app,
            upload_request(multipart_body(&[("a.txt", "text/plain", b"a".as_slice())])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn files_lists_every_object() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed("b-1-2.pdf", b"pdf", "application/pdf", &[(ORIGINAL_NAME_METADATA, "b.pdf")]);
        store.seed("a-3-4.png", b"png!", "image/png", &[]);
        let app = app_with(store);

        let response = send(app, Request::get("/files").body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["filename"], "a-3-4.png");
        assert_eq!(files[0]["originalName"], "a.png");
        assert_eq!(files[0]["size"], 4);
        assert!(files[0]["uploadDate"].is_string());
        assert_eq!(files[1]["originalName"], "b.pdf");
        assert!(files[1]["url"].as_str().unwrap().contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn files_reports_store_errors_as_json() {
        let store = Arc::new(MemoryObjectStore::new());
        store.set_offline(true);
        let app = app_with(store);

        let response = send(app, Request::get("/files").body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Error listing files");
    }

    #[tokio::test]
    async fn download_streams_attachment() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed("cv-1-2.pdf", b"%PDF", "application/pdf", &[(ORIGINAL_NAME_METADATA, "cv.pdf")]);
        let app = app_with(store);

        let response = send(
            app,
            Request::get("/download/cv-1-2.pdf").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"cv.pdf\""));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF");
    }

    #[tokio::test]
    async fn download_of_unknown_key_is_server_error() {
        let app = app_with(Arc::new(MemoryObjectStore::new()));

        let response = send(
            app,
            Request::get("/download/never-1-2.png").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("Error downloading file"));
    }

    #[tokio::test]
    async fn uploaded_file_round_trips_through_listing_and_download() {
        let store = Arc::new(MemoryObjectStore::new());
        let app = app_with(store);

        let response = send(
            app.clone(),
            upload_request(multipart_body(&[("field-notes.txt", "text/plain", b"bird".as_slice())])),
        )
        .await;
        let key = json_body(response).await["files"][0]["filename"]
            .as_str()
            .unwrap()
            .to_string();

        let listing = json_body(
            send(app.clone(), Request::get("/files").body(Body::empty()).unwrap()).await,
        )
        .await;
        assert_eq!(listing["files"][0]["filename"], key.as_str());
        assert_eq!(listing["files"][0]["originalName"], "field-notes.txt");

        let response = send(
            app,
            Request::get(format!("/download/{key}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"bird");
    }
}
