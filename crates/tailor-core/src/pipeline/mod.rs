//! Pipeline - ジョブ実行
//!
//! - **stages**: Fetch / Transform / Publish / Cleanup の各ステージ
//! - **runner**: 1 ジョブ分のステージ連鎖と結果の記録
//! - **worker**: キューを消費するワーカープール

pub mod runner;
pub mod stages;
pub mod worker;

pub use self::runner::Pipeline;
pub use self::stages::{
    CleanupStage, FetchStage, Fetched, NetworkPolicy, PublishStage, Published, StageContext,
    StageFailure, TransformStage, Transformed, sniff_content_type,
};
pub use self::worker::WorkerGroup;
