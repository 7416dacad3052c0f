use anyhow::Result;
use aws_config::{BehaviorVersion, Region};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    object_store::S3ObjectStore,
    secret_store::{AwsSecretStore, SecretStore, resolve_environment},
    upload_gateway::FileService,
};
use state::{AppState, ServiceInfo};

#[tokio::main]
async fn main() -> Result<()> {
    // --- .env (optional) ---
    let _ = dotenvy::dotenv();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting apprunner-demo with config: {:?}", cfg);

    // --- AWS configuration (env, profile, instance role), resolved once ---
    let aws = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(cfg.region.clone()))
        .load()
        .await;

    // --- Resolve environment label before binding ---
    let secrets = cfg.secret_name.as_ref().map(|_| AwsSecretStore::new(&aws));
    let env = resolve_environment(&cfg, secrets.as_ref().map(|s| s as &dyn SecretStore)).await;

    // --- Initialize core service ---
    let store = Arc::new(S3ObjectStore::from_config(&aws, &cfg));
    let files = FileService::new(store, cfg.signed_url_ttl(), cfg.list_max_keys);
    let info = ServiceInfo {
        name: cfg.app_name.clone(),
        env,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState::new(info, files));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
