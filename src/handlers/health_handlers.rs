//! Health, readiness and informational handlers.
//!
//! - GET /healthz      -> simple liveness ("ok")
//! - GET /readyz       -> readiness that checks the upload bucket
//! - GET /             -> service name and environment label
//! - GET /auto-deploy  -> deployment smoke check

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness probe. Always 200 with a plain-text `ok`; never performs I/O.
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /readyz`
///
/// Readiness probe that asks the object store whether the bucket is
/// reachable. HTTP 200 when it is, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let bucket_check = match state.files.store().probe().await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(e.to_string()),
        },
    };

    let overall_ok = bucket_check.ok;
    let mut checks = HashMap::new();
    checks.insert("bucket", bucket_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// `GET /`
pub async fn service_info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: state.info.name.clone(),
        env: state.info.env.clone(),
    })
}

/// `GET /auto-deploy`
pub async fn auto_deploy() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Auto deploy endpoint successful".into(),
    })
}

#[derive(Serialize)]
pub struct InfoResponse {
    name: String,
    env: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
