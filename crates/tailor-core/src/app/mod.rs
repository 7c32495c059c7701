//! App - アプリケーション層
//!
//! ports と pipeline を組み合わせてサービスを組み立てる。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: 設定の検証とワイヤリング
//! - **AdmissionService**: キャッシュ判定と enqueue
//! - **router**: HTTP（axum）
//! - **StatusReporter**: カウンタとキュー状態の照会

pub mod admission;
pub mod builder;
pub mod config;
pub mod http;
pub mod status;

pub use self::admission::{Admission, AdmissionService, ResizeRequest, ValidRequest};
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{ConfigError, RetrySettings, ServiceConfig, StorageConfig};
pub use self::http::{AppState, router};
pub use self::status::{StatusReporter, StatusView};
