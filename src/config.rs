use crate::{models::byte_size::ByteSize, services::storage_manager::StorageSettings};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; immutable after start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub web_root: PathBuf,
    pub data_dir: PathBuf,
    pub max_size: ByteSize,
    /// Maximum lifetime of an upload, in seconds.
    pub max_lifetime: u64,
    pub sweep_interval_secs: u64,
    pub name_length: usize,
    pub request_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Ephemeral file drop server")]
pub struct Args {
    /// Host to bind to (overrides FILEDROP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEDROP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory of the frontend build (overrides FILEDROP_WEBROOT)
    #[arg(long)]
    pub webroot: Option<PathBuf>,

    /// Max size of an uploaded file, e.g. 8MB (overrides FILEDROP_MAX_SIZE)
    #[arg(long)]
    pub size: Option<String>,

    /// Max lifetime of a file in seconds (overrides FILEDROP_MAX_LIFETIME)
    #[arg(long)]
    pub lifetime: Option<u64>,

    /// Directory holding uploads and metadata (overrides FILEDROP_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Seconds between expiry sweeps (overrides FILEDROP_SWEEP_INTERVAL)
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    /// Length of generated file names (overrides FILEDROP_NAME_LENGTH)
    #[arg(long)]
    pub name_length: Option<usize>,

    /// Per-request timeout in seconds (overrides FILEDROP_REQUEST_TIMEOUT)
    #[arg(long)]
    pub request_timeout: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Merge parsed CLI args with environment fallbacks and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        let host = match args.host {
            Some(host) => host,
            None => env::var("FILEDROP_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        };
        let size = match args.size {
            Some(size) => size,
            None => env::var("FILEDROP_MAX_SIZE").unwrap_or_else(|_| "8MB".into()),
        };
        let max_size = size
            .parse::<ByteSize>()
            .with_context(|| format!("parsing max upload size `{}`", size))?;

        let cfg = Self {
            host,
            port: or_env(args.port, "FILEDROP_PORT", 8000)?,
            web_root: args.webroot.unwrap_or_else(|| {
                env::var("FILEDROP_WEBROOT")
                    .unwrap_or_else(|_| "../frontend/build".into())
                    .into()
            }),
            data_dir: args.data_dir.unwrap_or_else(|| {
                env::var("FILEDROP_DATA_DIR")
                    .unwrap_or_else(|_| ".".into())
                    .into()
            }),
            max_size,
            max_lifetime: or_env(args.lifetime, "FILEDROP_MAX_LIFETIME", 7 * 24 * 60 * 60)?,
            sweep_interval_secs: or_env(args.sweep_interval, "FILEDROP_SWEEP_INTERVAL", 60)?,
            name_length: or_env(args.name_length, "FILEDROP_NAME_LENGTH", 6)?,
            request_timeout_secs: or_env(args.request_timeout, "FILEDROP_REQUEST_TIMEOUT", 15)?,
        };

        if cfg.sweep_interval_secs == 0 {
            anyhow::bail!("sweep interval must be at least one second");
        }
        if cfg.name_length == 0 {
            anyhow::bail!("name length must be at least one character");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            data_dir: self.data_dir.clone(),
            max_size: self.max_size,
            max_lifetime: self.max_lifetime,
            name_length: self.name_length,
        }
    }
}

/// CLI value if given, else the parsed environment variable, else `default`.
fn or_env<T>(cli: Option<T>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
