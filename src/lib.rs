//! # media-dl
//!
//! Concurrent batch downloader for online video, built as a library.
//!
//! Give it a list of video URLs and it will:
//! - normalize every URL to one canonical form
//! - skip videos already present in the download directory
//! - fetch metadata through an extraction backend (the `yt-dlp` binary by default),
//!   caching it on disk between runs
//! - pick the best encoding under a height cap
//! - download direct HTTP formats in parallel byte-range segments that survive
//!   interruption, and hand streaming or split formats to the backend
//! - report every state change on a broadcast event channel and finish with a
//!   summary of the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, Event, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.max_concurrent_downloads = 8;
//!
//!     let downloader = MediaDownloader::new(config).await?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::StateChanged { video, state, .. } = event {
//!                 println!("{} -> {:?}", video.url, state);
//!             }
//!         }
//!     });
//!
//!     let summary = downloader
//!         .download_batch([
//!             "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!             "https://youtu.be/9bZkp7q19f0",
//!         ])
//!         .await?;
//!     println!("{summary}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Extraction backends (metadata, playlists, backend-managed downloads)
pub mod backend;
/// Persistent metadata cache
pub mod cache;
/// URL canonicalization
pub mod canonical;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Index of artifacts already on disk
pub mod duplicates;
/// Error types
pub mod error;
/// Encoding selection
pub mod format_selector;
/// Retry logic with configurable backoff
pub mod retry;
/// Run statistics
pub mod stats;
/// Byte transfer: transports and the segmented engine
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use backend::{BackendDownload, ExtractionBackend, YtDlpBackend};
pub use config::Config;
pub use downloader::MediaDownloader;
pub use error::{Error, ExtractionFailure, Result, TransferError};
pub use transfer::{HttpTransport, Transport};
pub use types::{
    BatchSummary, Event, FailedItem, FailureInfo, FailureKind, FormatRecord, PlaylistInfo,
    StatsSnapshot, TaskId, TaskOutcome, TaskState, VideoIdentity, VideoRecord,
};

/// Wait for a termination signal, then shut the downloader down.
///
/// - **Unix:** SIGTERM or SIGINT. If neither handler can be registered, falls
///   back to `tokio::signal::ctrl_c()`.
/// - **Other platforms:** Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///
///     let worker = downloader.clone();
///     tokio::spawn(async move {
///         worker.download_one("https://youtu.be/dQw4w9WgXcQ").await
///     });
///
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());

    match (sigterm, sigint) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
