//! Command line arguments. Every `serve` flag has a `TAILOR_*` env fallback
//! and overrides the matching [`ServiceConfig`] default.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tailor_core::app::config::{DEFAULT_LOCAL_ROOT, DEFAULT_PUBLIC_BASE_URL};
use tailor_core::app::{RetrySettings, ServiceConfig, StorageConfig};

#[derive(Debug, Parser)]
#[command(name = "tailor", version, about = "Image resize service with request deduplication")]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "TAILOR_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP listener and the worker pool.
    Serve(ServeArgs),

    /// Print the fingerprint and derived file names of a request.
    Fingerprint {
        url: String,
        width: u32,
        height: u32,

        #[arg(long, default_value = "images")]
        key_prefix: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Local,
    Http,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "TAILOR_BIND")]
    pub bind: Option<String>,

    #[arg(long, env = "TAILOR_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "TAILOR_WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "TAILOR_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    #[arg(long, env = "TAILOR_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Keep the artifact index on disk (survives restarts).
    #[arg(long, env = "TAILOR_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    #[arg(long, env = "TAILOR_KEY_PREFIX")]
    pub key_prefix: Option<String>,

    #[arg(long, value_enum, env = "TAILOR_STORAGE", default_value = "local")]
    pub storage: StorageKind,

    /// Directory used as the bucket by local storage.
    #[arg(long, env = "TAILOR_LOCAL_ROOT")]
    pub local_root: Option<PathBuf>,

    #[arg(long, env = "TAILOR_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    #[arg(long, env = "TAILOR_BUCKET")]
    pub bucket: Option<String>,

    #[arg(long, env = "TAILOR_REGION", default_value = "us-east-1")]
    pub region: String,

    /// S3-compatible endpoint; derived from the region when unset.
    #[arg(long, env = "TAILOR_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "TAILOR_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    #[arg(long, env = "TAILOR_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    #[arg(long, env = "TAILOR_PUBLISH_TIMEOUT_SECS")]
    pub publish_timeout_secs: Option<u64>,

    #[arg(long, env = "TAILOR_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    #[arg(long, env = "TAILOR_JPEG_QUALITY")]
    pub jpeg_quality: Option<u8>,

    /// Largest width or height a request may ask for.
    #[arg(long, env = "TAILOR_MAX_DIMENSION")]
    pub max_dimension: Option<u32>,

    /// Largest output size in pixels.
    #[arg(long, env = "TAILOR_MAX_PIXELS")]
    pub max_pixels: Option<u64>,
}

impl ServeArgs {
    pub fn into_config(self) -> ServiceConfig {
        let mut config = ServiceConfig::default();

        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(work_dir) = self.work_dir {
            config.work_dir = work_dir;
        }
        config.index_dir = self.index_dir;
        if let Some(prefix) = self.key_prefix {
            config.key_prefix = prefix;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config.fetch_timeout_secs = secs;
        }
        if let Some(secs) = self.publish_timeout_secs {
            config.publish_timeout_secs = secs;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry = RetrySettings {
                max_attempts,
                ..config.retry
            };
        }
        if let Some(quality) = self.jpeg_quality {
            config.jpeg_quality = quality;
        }
        if let Some(max) = self.max_dimension {
            config.max_dimension = max;
        }
        if let Some(max) = self.max_pixels {
            config.max_pixels = max;
        }

        config.storage = match self.storage {
            StorageKind::Local => StorageConfig::Local {
                root: self
                    .local_root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_ROOT)),
                public_base_url: self
                    .public_base_url
                    .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string()),
            },
            StorageKind::Http => StorageConfig::Http {
                bucket: self.bucket.unwrap_or_default(),
                region: self.region,
                endpoint: self.endpoint,
                public_base_url: self.public_base_url,
            },
        };
        config
    }
}
