//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`batch`] - Single, batch and playlist entry points
//! - [`lifecycle`] - Shutdown and cancellation
//! - [`download_task`] - Per-video state machine
//! - [`background_tasks`] - Progress forwarding and periodic statistics

mod background_tasks;
mod batch;
mod download_task;
mod lifecycle;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::backend::{ExtractionBackend, YtDlpBackend};
use crate::cache::MetadataCache;
use crate::config::Config;
use crate::duplicates::DuplicateIndex;
use crate::error::{Error, Result};
use crate::stats::RunStatistics;
use crate::transfer::{ChunkedTransfer, HttpTransport, Transport};
use crate::types::{Event, TaskId};

use download_task::TaskContext;

/// Shared collaborators handed to every task
#[derive(Clone)]
pub(crate) struct Services {
    /// Metadata extraction and backend-managed downloads
    pub(crate) backend: Arc<dyn ExtractionBackend>,
    /// Segmented transfer engine for direct HTTP formats
    pub(crate) transfer: Arc<ChunkedTransfer>,
    /// Persistent metadata cache
    pub(crate) cache: Arc<MetadataCache>,
    /// Known artifacts in the download directory
    pub(crate) duplicates: Arc<DuplicateIndex>,
}

/// Concurrency and cancellation state
#[derive(Clone)]
pub(crate) struct RunState {
    /// Permit pool bounding per-video work (extraction and transfer alike)
    pub(crate) permits: Arc<Semaphore>,
    /// Map of running tasks to their cancellation tokens
    pub(crate) active_tasks: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    /// Flag to indicate whether new work is accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every batch and task token; replaced by `cancel_all`
    pub(crate) run_token: Arc<RwLock<CancellationToken>>,
    /// Next task id counter
    pub(crate) next_task_id: Arc<AtomicU64>,
}

impl RunState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            active_tasks: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            run_token: Arc::new(RwLock::new(CancellationToken::new())),
            next_task_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Cache, duplicate index, backend and transfer engine
    pub(crate) services: Services,
    /// Permit pool, active tasks and cancellation
    pub(crate) run_state: RunState,
}

impl MediaDownloader {
    /// Create a downloader backed by the `yt-dlp` binary and an HTTP transport
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Locates the `yt-dlp` binary (explicit path first, then PATH)
    /// - Creates the download directory
    /// - Loads the metadata cache and indexes existing downloads
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for invalid settings, [`Error::NotSupported`] when no
    /// `yt-dlp` binary can be found.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = YtDlpBackend::from_config(&config.extractor)?;
        tracing::info!(
            binary = %backend.binary_path().display(),
            "Extraction backend initialized"
        );
        let transport = HttpTransport::new(&config.transfer)?;
        Self::with_components(config, Arc::new(backend), Arc::new(transport)).await
    }

    /// Create a downloader with caller-supplied backend and transport
    pub async fn with_components(
        config: Config,
        backend: Arc<dyn ExtractionBackend>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let cache = MetadataCache::open(&config.cache).await?;
        let duplicates =
            DuplicateIndex::scan(&config.download.download_dir, &config.download.media_extensions)
                .await?;
        let transfer = ChunkedTransfer::new(transport, &config.transfer);

        tracing::info!(
            backend = backend.name(),
            transport = transfer.transport_name(),
            max_concurrent = config.download.max_concurrent_downloads,
            cached_records = cache.len().await,
            "Downloader initialized"
        );

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let run_state = RunState::new(config.download.max_concurrent_downloads);

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            services: Services {
                backend,
                transfer: Arc::new(transfer),
                cache: Arc::new(cache),
                duplicates: Arc::new(duplicates),
            },
            run_state,
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("{}", serde_json::to_string(&event).unwrap_or_default());
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.run_state.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    pub(crate) fn allocate_task_id(&self) -> TaskId {
        TaskId(self.run_state.next_task_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Current run-level token
    pub(crate) async fn run_token(&self) -> CancellationToken {
        self.run_state.run_token.read().await.clone()
    }

    /// Build the context for one task and register it as active
    pub(crate) async fn task_context(
        &self,
        url: &str,
        stats: Arc<RunStatistics>,
        parent: &CancellationToken,
    ) -> TaskContext {
        let id = self.allocate_task_id();
        let cancel_token = parent.child_token();
        self.run_state
            .active_tasks
            .lock()
            .await
            .insert(id, cancel_token.clone());

        TaskContext {
            id,
            url: url.to_string(),
            event_tx: self.event_tx.clone(),
            config: self.config.clone(),
            services: self.services.clone(),
            permits: self.run_state.permits.clone(),
            stats,
            cancel_token,
            active_tasks: self.run_state.active_tasks.clone(),
        }
    }
}
