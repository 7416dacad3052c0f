//! Startup-time lookup of the deployment environment label.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::{Client, error::DisplayErrorContext};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret `{0}` has no string value")]
    Empty(String),
    #[error("secret `{name}` is not valid JSON: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("secret `{0}` has no APP_ENV field")]
    MissingField(String),
    #[error("secret store request failed: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;
}

/// AWS Secrets Manager client.
pub struct AwsSecretStore {
    client: Client,
}

impl AwsSecretStore {
    pub fn new(shared: &SdkConfig) -> Self {
        Self {
            client: Client::new(shared),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|err| SecretError::Upstream(DisplayErrorContext(err).to_string()))?;
        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| SecretError::Empty(name.to_string()))
    }
}

#[derive(Deserialize)]
struct EnvironmentSecret {
    #[serde(rename = "APP_ENV")]
    app_env: Option<String>,
}

/// Read the `APP_ENV` field of the JSON secret `name`.
pub async fn fetch_environment(store: &dyn SecretStore, name: &str) -> Result<String, SecretError> {
    let raw = store.get_secret(name).await?;
    let secret: EnvironmentSecret =
        serde_json::from_str(&raw).map_err(|source| SecretError::Malformed {
            name: name.to_string(),
            source,
        })?;
    secret
        .app_env
        .filter(|env| !env.is_empty())
        .ok_or_else(|| SecretError::MissingField(name.to_string()))
}

/// Environment label for this process: the secret's value when it can be
/// read, otherwise the configured fallback. Never fails.
pub async fn resolve_environment(cfg: &AppConfig, store: Option<&dyn SecretStore>) -> String {
    let (Some(name), Some(store)) = (cfg.secret_name.as_deref(), store) else {
        return cfg.app_env.clone();
    };

    match fetch_environment(store, name).await {
        Ok(env) => {
            info!(secret = name, env = %env, "loaded environment from secret store");
            env
        }
        Err(err) => {
            warn!(
                secret = name,
                error = %err,
                fallback = %cfg.app_env,
                "could not read environment from secret store, using fallback"
            );
            cfg.app_env.clone()
        }
    }
}
