//! ServiceConfig - 起動時設定
//!
//! CLI（clap + `TAILOR_*` 環境変数）で一度だけ組み立て、検証してから
//! 各コンポーネントに値で渡す。グローバル状態は持たない。

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impls::image_transformer::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_PIXELS};
use crate::pipeline::NetworkPolicy;
use crate::queue::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be greater than 0")]
    NoWorkers,

    #[error("queue_capacity must be greater than 0")]
    NoQueueCapacity,

    #[error("{field} must be greater than 0")]
    ZeroLimit { field: &'static str },

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("storage bucket must not be empty")]
    EmptyBucket,

    #[error("invalid storage url {0:?}: must be an absolute http(s) url")]
    StorageUrl(String),

    #[error("{field} must be greater than 0")]
    ZeroTimeout { field: &'static str },

    #[error("invalid retry settings: {0}")]
    Retry(String),
}

pub const DEFAULT_LOCAL_ROOT: &str = "./published";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000/published";
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Where resized images are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Files under `root`, assumed to be served at `public_base_url`.
    Local {
        root: PathBuf,
        public_base_url: String,
    },
    /// S3-compatible bucket, path-style addressing.
    Http {
        bucket: String,
        region: String,
        /// Defaults to `https://s3.<region>.amazonaws.com`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_base_url: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from(DEFAULT_LOCAL_ROOT),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }
}

impl StorageConfig {
    /// Upload endpoint of the HTTP store. `None` for local storage.
    pub fn endpoint(&self) -> Option<String> {
        match self {
            StorageConfig::Local { .. } => None,
            StorageConfig::Http {
                endpoint: Some(endpoint),
                ..
            } => Some(endpoint.clone()),
            StorageConfig::Http { region, .. } => Some(format!("https://s3.{region}.amazonaws.com")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,

    /// Size of the pipeline worker pool.
    pub workers: usize,
    /// Pending jobs the queue holds before admission blocks.
    pub queue_capacity: usize,

    /// Local scratch directory for originals and resized files.
    pub work_dir: PathBuf,
    /// Durable artifact index. In-memory when unset.
    pub index_dir: Option<PathBuf>,

    pub key_prefix: String,
    pub storage: StorageConfig,

    pub connect_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub retry: RetrySettings,

    pub jpeg_quality: u8,
    /// Largest `width` or `height` admission accepts.
    pub max_dimension: u32,
    /// Largest output `width * height` the transformer will allocate.
    pub max_pixels: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            workers: 5,
            queue_capacity: 10,
            work_dir: PathBuf::from("./work"),
            index_dir: None,
            key_prefix: "images".to_string(),
            storage: StorageConfig::default(),
            connect_timeout_secs: 10,
            fetch_timeout_secs: 30,
            publish_timeout_secs: 60,
            retry: RetrySettings::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

impl ServiceConfig {
    /// Fail-fast check, run once before anything is wired.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NoQueueCapacity);
        }
        if self.max_dimension == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_dimension",
            });
        }
        if self.max_pixels == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_pixels",
            });
        }
        self.socket_addr()?;

        for (field, secs) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("publish_timeout_secs", self.publish_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Retry("max_attempts must be at least 1".to_string()));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Retry(format!(
                "multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }

        match &self.storage {
            StorageConfig::Local {
                public_base_url, ..
            } => {
                if !is_http_url(public_base_url) {
                    return Err(ConfigError::StorageUrl(public_base_url.clone()));
                }
            }
            StorageConfig::Http {
                bucket,
                public_base_url,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err(ConfigError::EmptyBucket);
                }
                let endpoint = self.storage.endpoint().unwrap_or_default();
                if !is_http_url(&endpoint) {
                    return Err(ConfigError::StorageUrl(endpoint));
                }
                if let Some(base) = public_base_url
                    && !is_http_url(base)
                {
                    return Err(ConfigError::StorageUrl(base.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_address, self.port);
        raw.parse().map_err(|_| ConfigError::BindAddress(raw))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn fetch_policy(&self) -> NetworkPolicy {
        NetworkPolicy::new(Duration::from_secs(self.fetch_timeout_secs), self.retry.policy())
    }

    pub fn publish_policy(&self) -> NetworkPolicy {
        NetworkPolicy::new(Duration::from_secs(self.publish_timeout_secs), self.retry.policy())
    }
}
