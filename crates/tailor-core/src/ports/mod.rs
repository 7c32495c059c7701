//! Ports - 抽象化レイヤー
//!
//! パイプラインが依存する外部コラボレータのインターフェース。
//! 実装の詳細（reqwest, image, S3 など）は `impls` に置く。
//!
//! # 設計原則
//! - ArtifactIndex は差し替え可能（インメモリ → 共有ストア）
//! - ネットワークを伴う port は async、CPU 処理（Transformer）は同期
//! - 時刻は Clock 経由で取得（テストで固定できる）

pub mod artifact_index;
pub mod clock;
pub mod fetcher;
pub mod object_store;
pub mod outcome_sink;
pub mod transformer;

pub use self::artifact_index::{ArtifactIndex, Lookup};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::fetcher::Fetcher;
pub use self::object_store::{ObjectStore, PutObject, Visibility};
pub use self::outcome_sink::{ChannelOutcomeSink, NoopOutcomeSink, OutcomeEvent, OutcomeSink};
pub use self::transformer::ImageTransformer;
