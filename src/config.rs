//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Download behavior configuration (directories, concurrency, quality ceiling)
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent per-video operations, extraction and transfer combined (default: 20)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Quality ceiling used when scoring formats (default: 1080)
    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Extensions recognized as finished media when scanning for duplicates
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    /// Write a `{title}_description.txt` sidecar next to each artifact (default: false)
    #[serde(default)]
    pub save_description: bool,

    /// Interval between statistics snapshots during a batch (default: 1 second)
    #[serde(default = "default_stats_interval", with = "duration_serde")]
    pub stats_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            max_height: default_max_height(),
            media_extensions: default_media_extensions(),
            save_description: false,
            stats_interval: default_stats_interval(),
        }
    }
}

/// Chunked transfer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Segment size in bytes (default: 10 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Maximum segments downloading at once within one transfer (default: 4)
    ///
    /// Independent of `max_concurrent_downloads`; bounds fan-out on very large files.
    #[serde(default = "default_segments_in_flight")]
    pub max_segments_in_flight: usize,

    /// Timeout for a single network call or body read (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_segments_in_flight: default_segments_in_flight(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Extraction tool (yt-dlp) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Socket timeout passed to the tool (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub socket_timeout: Duration,

    /// Retries performed inside the tool for HTTP and fragment errors (default: 10)
    #[serde(default = "default_tool_retries")]
    pub retries: u32,

    /// Fragments the tool downloads concurrently for streaming protocols (default: 10)
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,

    /// Container used when the tool merges separate video and audio streams (default: "mp4")
    #[serde(default = "default_merge_format")]
    pub merge_output_format: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            socket_timeout: default_request_timeout(),
            retries: default_tool_retries(),
            concurrent_fragments: default_concurrent_fragments(),
            merge_output_format: default_merge_format(),
        }
    }
}

/// Metadata cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persist extracted metadata between runs (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache file location (default: ".media_dl/metadata.json")
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Treat entries older than this as misses (None = never expire)
    #[serde(default, with = "optional_duration_serde")]
    pub max_age: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            max_age: None,
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space to maintain (default: 512 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Multiplier for the expected artifact size (default: 1.1)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
            size_multiplier: default_size_multiplier(),
        }
    }
}

/// Retry configuration for transient failures
///
/// Applied by the batch coordinator around metadata extraction and by the
/// orchestrator around transfers. `max_retries` counts retries after the first
/// attempt, so the default of 2 means three attempts in total.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2, three attempts in total)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 1.0, a fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Main configuration for the downloader
///
/// Download settings are flattened for a compact serialized form; the other
/// groups serialize as nested objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings (directories, concurrency, quality)
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Chunked transfer settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Extraction tool settings
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Metadata cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Disk space checks
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Retry behavior for extraction and transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Reject settings that would stall or divide by zero
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(config_error(
                "max_concurrent_downloads must be at least 1",
                "max_concurrent_downloads",
            ));
        }
        if self.transfer.chunk_size == 0 {
            return Err(config_error("chunk_size must be at least 1", "chunk_size"));
        }
        if self.transfer.max_segments_in_flight == 0 {
            return Err(config_error(
                "max_segments_in_flight must be at least 1",
                "max_segments_in_flight",
            ));
        }
        if self.transfer.request_timeout.is_zero() {
            return Err(config_error(
                "request_timeout must be greater than zero",
                "request_timeout",
            ));
        }
        if self.download.stats_interval.is_zero() {
            return Err(config_error(
                "stats_interval must be greater than zero",
                "stats_interval",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    20
}

fn default_max_height() -> u32 {
    1080
}

fn default_media_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "mkv".to_string(), "webm".to_string()]
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_chunk_size() -> u64 {
    10 * 1024 * 1024
}

fn default_segments_in_flight() -> usize {
    4
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("media-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_tool_retries() -> u32 {
    10
}

fn default_concurrent_fragments() -> u32 {
    10
}

fn default_merge_format() -> String {
    "mp4".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".media_dl").join("metadata.json")
}

fn default_min_free_space() -> u64 {
    512 * 1024 * 1024
}

fn default_size_multiplier() -> f64 {
    1.1
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
