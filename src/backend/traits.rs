//! Extraction backend seam

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::transfer::TransferProgress;
use crate::types::{PlaylistInfo, VideoRecord};

/// A download the backend performs itself (streaming protocols, audio merges)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDownload {
    /// Canonical video URL
    pub url: String,
    /// Backend format selector, e.g. `137+bestaudio/best`
    pub format_selector: String,
    /// Output path without extension; the backend picks the extension
    pub output_stem: PathBuf,
    /// Container used when merging separate streams
    pub merge_output_format: String,
}

/// Source of metadata and of backend-managed downloads
///
/// The production implementation is [`YtDlpBackend`](super::YtDlpBackend).
/// Implementations must be shareable across tasks.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Fetch metadata for one video
    ///
    /// # Errors
    ///
    /// [`Error::Extraction`](crate::Error::Extraction) classified by cause.
    async fn extract_info(&self, url: &str) -> Result<VideoRecord>;

    /// List the entries of a playlist
    async fn expand_playlist(&self, url: &str) -> Result<PlaylistInfo>;

    /// Download and merge `request`, returning the final artifact path
    async fn download(
        &self,
        request: &BackendDownload,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<PathBuf>;

    /// Get the name of this backend implementation
    fn name(&self) -> &'static str;
}
