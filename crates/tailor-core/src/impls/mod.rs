//! Impls - port の実装
//!
//! # 含まれる実装
//! - **InMemoryArtifactIndex** / **FsArtifactIndex**: 成果物インデックス
//! - **ReqwestFetcher**: HTTP ダウンロード
//! - **ImageCrateTransformer**: `image` クレートによるリサイズ
//! - **LocalObjectStore** / **HttpObjectStore**: 永続ストレージ

pub mod fs_index;
pub mod http_fetcher;
pub mod http_store;
pub mod image_transformer;
pub mod inmem_index;
pub mod local_store;

pub use self::fs_index::FsArtifactIndex;
pub use self::http_fetcher::ReqwestFetcher;
pub use self::http_store::HttpObjectStore;
pub use self::image_transformer::ImageCrateTransformer;
pub use self::inmem_index::InMemoryArtifactIndex;
pub use self::local_store::LocalObjectStore;
