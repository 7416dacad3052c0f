use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Upper bound for signed URL lifetimes handed out to clients.
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub app_name: String,
    /// Fallback environment label, used when no secret overrides it.
    pub app_env: String,
    pub secret_name: Option<String>,
    pub region: String,
    pub bucket: String,
    pub s3_endpoint: Option<String>,
    pub signed_url_ttl_secs: u64,
    pub list_max_keys: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "App Runner demo server with S3-backed uploads")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Secrets Manager secret holding APP_ENV (overrides SECRET_NAME)
    #[arg(long)]
    pub secret_name: Option<String>,

    /// AWS region (overrides AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Upload bucket (overrides S3_BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Custom S3 endpoint, e.g. a local MinIO (overrides S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::from_sources(args, |key| env::var(key).ok())
    }

    /// Merge CLI args over values produced by `lookup` (normally the process environment).
    pub fn from_sources<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Environment fallback ---
        let env_host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_or(&lookup, "PORT", 9090u16)?;
        let ttl = parse_or(&lookup, "SIGNED_URL_TTL_SECS", MAX_SIGNED_URL_TTL_SECS)?;
        let list_max_keys = parse_or(&lookup, "LIST_MAX_KEYS", 1000usize)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            app_name: lookup("APP_NAME").unwrap_or_else(|| "apprunner-demo".into()),
            app_env: lookup("APP_ENV").unwrap_or_else(|| "development".into()),
            secret_name: args
                .secret_name
                .or_else(|| lookup("SECRET_NAME"))
                .filter(|name| !name.trim().is_empty()),
            region: args
                .region
                .or_else(|| lookup("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            bucket: args
                .bucket
                .or_else(|| lookup("S3_BUCKET_NAME"))
                .unwrap_or_else(|| "apprunner-demo-uploads".into()),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| lookup("S3_ENDPOINT"))
                .filter(|url| !url.trim().is_empty()),
            signed_url_ttl_secs: ttl.clamp(1, MAX_SIGNED_URL_TTL_SECS),
            list_max_keys: list_max_keys.max(1),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}
