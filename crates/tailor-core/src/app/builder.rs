//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 方針
//! - 設定は `build()` の最初に検証する（Fail-fast）
//! - 各 port は差し替え可能。未指定なら設定から既定の実装を組み立てる
//! - `build()` はワーカーを起動するので tokio ランタイム上で呼ぶ

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::IndexError;
use crate::impls::{
    FsArtifactIndex, HttpObjectStore, ImageCrateTransformer, InMemoryArtifactIndex,
    LocalObjectStore, ReqwestFetcher,
};
use crate::observability::PipelineCounts;
use crate::pipeline::{FetchStage, Pipeline, PublishStage, TransformStage, WorkerGroup};
use crate::ports::{
    ArtifactIndex, Clock, Fetcher, ImageTransformer, NoopOutcomeSink, ObjectStore, OutcomeSink,
    SystemClock,
};
use crate::queue::{InFlight, ResizeReceiver, bounded};

use super::admission::AdmissionService;
use super::config::{ConfigError, ServiceConfig, StorageConfig};
use super::http::{AppState, router};
use super::status::{StatusReporter, StatusView};

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("opening artifact index: {0}")]
    Index(#[from] IndexError),

    #[error("building http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("creating work dir {}: {source}", .path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .with_store(Arc::new(my_store))
///     .build()
///     .await?;
/// ```
pub struct AppBuilder {
    config: ServiceConfig,
    index: Option<Arc<dyn ArtifactIndex>>,
    store: Option<Arc<dyn ObjectStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    transformer: Option<Arc<dyn ImageTransformer>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn OutcomeSink>,
}

impl AppBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            index: None,
            store: None,
            fetcher: None,
            transformer: None,
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopOutcomeSink),
        }
    }

    pub fn with_index(mut self, index: Arc<dyn ArtifactIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn ImageTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 設定を検証し、全コンポーネントを組み立ててワーカーを起動する
    pub async fn build(self) -> Result<App, BuildError> {
        let config = self.config;
        config.validate()?;

        tokio::fs::create_dir_all(&config.work_dir)
            .await
            .map_err(|source| BuildError::WorkDir {
                path: config.work_dir.clone(),
                source,
            })?;

        let index: Arc<dyn ArtifactIndex> = match (self.index, &config.index_dir) {
            (Some(index), _) => index,
            (None, Some(dir)) => Arc::new(FsArtifactIndex::open(dir).await?),
            (None, None) => Arc::new(InMemoryArtifactIndex::new()),
        };
        let store = match self.store {
            Some(store) => store,
            None => default_store(&config)?,
        };
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(config.connect_timeout())?),
        };
        let transformer: Arc<dyn ImageTransformer> = match self.transformer {
            Some(transformer) => transformer,
            None => Arc::new(
                ImageCrateTransformer::new()
                    .with_jpeg_quality(config.jpeg_quality)
                    .with_max_pixels(config.max_pixels),
            ),
        };

        let counts = Arc::new(PipelineCounts::new());
        let inflight = InFlight::new();
        let (queue, receiver) = bounded(config.queue_capacity);

        let pipeline = Pipeline::new(
            config.work_dir.clone(),
            FetchStage::new(fetcher, config.fetch_policy()),
            TransformStage::new(transformer),
            PublishStage::new(
                store,
                Arc::clone(&index),
                self.clock,
                config.key_prefix.clone(),
                config.publish_policy(),
            ),
            Arc::clone(&counts),
        )
        .with_sink(self.sink);
        let workers = WorkerGroup::spawn(config.workers, receiver.clone(), Arc::new(pipeline));
        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            work_dir = %config.work_dir.display(),
            durable_index = config.index_dir.is_some(),
            "pipeline started"
        );

        let state = AppState {
            admission: AdmissionService::new(
                index,
                inflight.clone(),
                queue.clone(),
                Arc::clone(&counts),
            )
            .with_max_dimension(config.max_dimension),
            status: StatusReporter::new(counts, queue, inflight, config.workers),
        };

        Ok(App {
            config,
            state,
            receiver,
            workers,
        })
    }
}

fn default_store(config: &ServiceConfig) -> Result<Arc<dyn ObjectStore>, BuildError> {
    let store: Arc<dyn ObjectStore> = match &config.storage {
        StorageConfig::Local {
            root,
            public_base_url,
        } => Arc::new(LocalObjectStore::new(root.clone(), public_base_url.clone())),
        StorageConfig::Http {
            bucket,
            public_base_url,
            ..
        } => {
            let client = reqwest::Client::builder()
                .connect_timeout(config.connect_timeout())
                .build()?;
            let endpoint = config.storage.endpoint().unwrap_or_default();
            let mut store = HttpObjectStore::new(client, endpoint, bucket.clone());
            if let Some(base) = public_base_url {
                store = store.with_public_base_url(base.clone());
            }
            Arc::new(store)
        }
    };
    Ok(store)
}

/// App はアプリケーションのランタイム
///
/// - HTTP ハンドラの状態（受付・ステータス）
/// - 起動済みのワーカープール
pub struct App {
    config: ServiceConfig,
    state: AppState,
    receiver: ResizeReceiver,
    workers: WorkerGroup,
}

impl App {
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionService {
        &self.state.admission
    }

    pub fn status(&self) -> StatusView {
        self.state.status.snapshot()
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve HTTP on `listener` until `shutdown` fires, then stop the pipeline.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        let addr = listener.local_addr()?;
        info!("listening on http://{}", addr);

        let signal = shutdown.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;

        self.shutdown().await;
        served
    }

    /// Close the queue, cancel in-flight jobs and wait for the workers.
    /// Jobs still waiting in the queue are dropped.
    pub async fn shutdown(self) {
        info!("shutting down pipeline");
        self.receiver.close();
        self.workers.shutdown_and_join().await;
        info!("pipeline stopped");
    }

    /// Close the queue and let the workers finish everything already queued.
    pub async fn drain(self) {
        self.receiver.close();
        self.workers.join().await;
    }
}
