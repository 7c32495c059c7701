//! tailor-core
//!
//! Image resize service core: request dedup, bounded job queue and a
//! fetch → transform → publish → cleanup pipeline on a worker pool.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（fingerprint, job, artifact, outcome, errors）
//! - **ports**: 抽象化レイヤー（ArtifactIndex, Fetcher, ImageTransformer, ObjectStore, Clock, OutcomeSink）
//! - **impls**: port の実装（インメモリ / ファイル index、reqwest、image、ローカル / S3 互換ストア）
//! - **queue**: 有界ジョブキュー、single-flight、リトライポリシー
//! - **pipeline**: ステージ、ジョブ単位の実行、ワーカープール
//! - **app**: 受付判定、設定、ワイヤリング、HTTP
//! - **observability**: カウンタ

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod queue;
