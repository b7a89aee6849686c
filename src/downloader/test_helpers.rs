//! Shared test helpers: a scripted extraction backend and downloader builders.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;

use crate::backend::{BackendDownload, ExtractionBackend};
use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, ExtractionFailure, Result};
use crate::transfer::TransferProgress;
use crate::transfer::test_transport::MemoryTransport;
use crate::types::{FormatRecord, PlaylistInfo, VideoRecord};

/// Eleven-character ids accepted by the URL normalizer
pub(crate) const IDS: [&str; 4] = ["aaaaaaaaaa1", "bbbbbbbbbb2", "cccccccccc3", "dddddddddd4"];

pub(crate) fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

pub(crate) fn media_url(id: &str) -> String {
    format!("https://media.example/{id}.mp4")
}

/// A combined audio+video mp4 served directly over HTTPS
pub(crate) fn direct_format(id: &str, size: u64) -> FormatRecord {
    FormatRecord {
        format_id: "18".into(),
        url: Some(media_url(id)),
        protocol: Some("https".into()),
        height: Some(360),
        fps: Some(30.0),
        bitrate: Some(500.0),
        video_codec: Some("avc1".into()),
        audio_codec: Some("mp4a".into()),
        extension: "mp4".into(),
        file_size: Some(size),
        file_size_approx: None,
    }
}

/// Video-only stream that needs a backend merge
pub(crate) fn video_only_format() -> FormatRecord {
    FormatRecord {
        format_id: "137".into(),
        url: Some("https://media.example/dash/137".into()),
        protocol: Some("https".into()),
        height: Some(1080),
        fps: Some(30.0),
        bitrate: Some(4000.0),
        video_codec: Some("avc1".into()),
        audio_codec: Some("none".into()),
        extension: "mp4".into(),
        file_size: None,
        file_size_approx: None,
    }
}

pub(crate) fn audio_only_format() -> FormatRecord {
    FormatRecord {
        format_id: "140".into(),
        url: Some("https://media.example/dash/140".into()),
        protocol: Some("https".into()),
        video_codec: Some("none".into()),
        audio_codec: Some("mp4a".into()),
        extension: "m4a".into(),
        ..FormatRecord::default()
    }
}

pub(crate) fn record(id: &str, title: &str, formats: Vec<FormatRecord>) -> VideoRecord {
    VideoRecord {
        url: watch_url(id),
        id: Some(id.to_string()),
        title: title.to_string(),
        duration: Some(212.0),
        uploader: Some("Test Channel".into()),
        view_count: Some(42),
        upload_date: Some("20240101".into()),
        description: None,
        tags: vec![],
        formats,
    }
}

/// Extraction backend answering from a script, with call counters
pub(crate) struct FakeBackend {
    records: HashMap<String, VideoRecord>,
    failures: HashMap<String, ExtractionFailure>,
    garbled: HashSet<String>,
    playlists: HashMap<String, PlaylistInfo>,
    extract_latency: Option<Duration>,
    download_latency: Option<Duration>,
    download_payload: Vec<u8>,
    extract_calls: AtomicUsize,
    download_calls: AtomicUsize,
    playlist_calls: AtomicUsize,
    in_flight: AtomicUsize,
    /// Highest number of concurrent extractions observed
    pub(crate) peak_in_flight: AtomicUsize,
    downloads_in_flight: AtomicUsize,
    /// Highest number of concurrent backend downloads observed
    pub(crate) peak_downloads: AtomicUsize,
    busy: AtomicUsize,
    /// Highest number of extractions and downloads running at once
    pub(crate) peak_busy: AtomicUsize,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
            failures: HashMap::new(),
            garbled: HashSet::new(),
            playlists: HashMap::new(),
            extract_latency: None,
            download_latency: None,
            download_payload: b"merged media".to_vec(),
            extract_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            playlist_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            downloads_in_flight: AtomicUsize::new(0),
            peak_downloads: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
            peak_busy: AtomicUsize::new(0),
        }
    }

    /// Answer `extract_info` for the canonical URL of `record`
    pub(crate) fn with_record(mut self, record: VideoRecord) -> Self {
        self.records.insert(record.url.clone(), record);
        self
    }

    pub(crate) fn with_failure(mut self, id: &str, failure: ExtractionFailure) -> Self {
        self.failures.insert(watch_url(id), failure);
        self
    }

    /// Answer `extract_info` for `id` with output that is not JSON
    pub(crate) fn with_garbled_output(mut self, id: &str) -> Self {
        self.garbled.insert(watch_url(id));
        self
    }

    pub(crate) fn with_playlist(mut self, url: &str, playlist: PlaylistInfo) -> Self {
        self.playlists.insert(url.to_string(), playlist);
        self
    }

    pub(crate) fn with_extract_latency(mut self, latency: Duration) -> Self {
        self.extract_latency = Some(latency);
        self
    }

    pub(crate) fn with_download_latency(mut self, latency: Duration) -> Self {
        self.download_latency = Some(latency);
        self
    }

    fn enter(&self, counter: &AtomicUsize, peak: &AtomicUsize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        let busy = self.busy.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_busy.fetch_max(busy, Ordering::SeqCst);
    }

    fn leave(&self, counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::SeqCst);
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn playlist_calls(&self) -> usize {
        self.playlist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for FakeBackend {
    async fn extract_info(&self, url: &str) -> Result<VideoRecord> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(&self.in_flight, &self.peak_in_flight);
        if let Some(latency) = self.extract_latency {
            tokio::time::sleep(latency).await;
        }
        self.leave(&self.in_flight);

        if self.garbled.contains(url) {
            return Err(serde_json::from_slice::<serde_json::Value>(b"ERROR: not json")
                .unwrap_err()
                .into());
        }

        if let Some(kind) = self.failures.get(url) {
            return Err(Error::Extraction {
                url: url.to_string(),
                kind: *kind,
                message: "scripted failure".into(),
            });
        }
        self.records.get(url).cloned().ok_or_else(|| Error::Extraction {
            url: url.to_string(),
            kind: ExtractionFailure::NotFound,
            message: "Video unavailable".into(),
        })
    }

    async fn expand_playlist(&self, url: &str) -> Result<PlaylistInfo> {
        self.playlist_calls.fetch_add(1, Ordering::SeqCst);
        self.playlists.get(url).cloned().ok_or_else(|| Error::Extraction {
            url: url.to_string(),
            kind: ExtractionFailure::NotFound,
            message: "playlist does not exist".into(),
        })
    }

    async fn download(
        &self,
        request: &BackendDownload,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<PathBuf> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(&self.downloads_in_flight, &self.peak_downloads);
        if let Some(latency) = self.download_latency {
            tokio::time::sleep(latency).await;
        }
        self.leave(&self.downloads_in_flight);

        let path = request
            .output_stem
            .with_extension(&request.merge_output_format);
        tokio::fs::write(&path, &self.download_payload).await?;
        if let Some(tx) = progress {
            let total = self.download_payload.len() as u64;
            tx.try_send(TransferProgress {
                downloaded_bytes: total,
                total_bytes: total,
            })
            .ok();
        }
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Config rooted in a fresh temp directory, with instant retries
pub(crate) fn test_config(root: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.path().join("downloads");
    config.download.max_concurrent_downloads = 3;
    config.download.stats_interval = Duration::from_millis(50);
    config.cache.path = root.path().join(".media_dl").join("metadata.json");
    config.transfer.chunk_size = 1024;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.disk_space.enabled = false;
    config
}

/// Test downloader over a fake backend and an in-memory transport.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    backend: Arc<FakeBackend>,
    transport: Arc<MemoryTransport>,
) -> (MediaDownloader, TempDir) {
    let root = tempdir().unwrap();
    let config = test_config(&root);
    let downloader = downloader_with_config(config, backend, transport).await;
    (downloader, root)
}

pub(crate) async fn downloader_with_config(
    config: Config,
    backend: Arc<FakeBackend>,
    transport: Arc<MemoryTransport>,
) -> MediaDownloader {
    MediaDownloader::with_components(config, backend, transport)
        .await
        .unwrap()
}
