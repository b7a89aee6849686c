//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::duplicates::sanitize_filename;

/// Identifier assigned to each orchestrated download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(TaskId)
    }
}

/// Metadata for one remote video, as returned by the extraction backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Canonical source URL
    pub url: String,
    /// Site-assigned stable identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Display name, also the basis of the on-disk filename
    pub title: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Channel or account that published the video
    #[serde(default)]
    pub uploader: Option<String>,
    /// Number of views at extraction time
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Upload date as reported by the site (YYYYMMDD)
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Long-form description text
    #[serde(default)]
    pub description: Option<String>,
    /// Tags attached to the video
    #[serde(default)]
    pub tags: Vec<String>,
    /// Available encodings, in the order the backend listed them
    #[serde(default)]
    pub formats: Vec<FormatRecord>,
}

impl VideoRecord {
    /// Key used for the metadata cache (video id, falling back to the URL)
    pub fn cache_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }

    /// Whether at least one encoding carries a video stream
    pub fn has_video_format(&self) -> bool {
        self.formats.iter().any(FormatRecord::has_video)
    }

    /// Filename stem of the final artifact
    ///
    /// Uses the sanitized title; falls back to the sanitized id and finally to
    /// `"video"` when the title sanitizes to nothing.
    pub fn artifact_stem(&self) -> String {
        let from_title = sanitize_filename(&self.title);
        if !from_title.is_empty() {
            return from_title;
        }
        self.id
            .as_deref()
            .map(sanitize_filename)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// One encoding variant of a video
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatRecord {
    /// Opaque selector understood by the extraction backend
    pub format_id: String,
    /// Direct media URL, when the backend exposes one
    #[serde(default)]
    pub url: Option<String>,
    /// Delivery protocol (`https`, `m3u8_native`, `http_dash_segments`, ...)
    #[serde(default)]
    pub protocol: Option<String>,
    /// Frame height in pixels
    #[serde(default)]
    pub height: Option<u32>,
    /// Frames per second
    #[serde(default)]
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s
    #[serde(default)]
    pub bitrate: Option<f64>,
    /// Video codec, `"none"` when the stream has no video
    #[serde(default)]
    pub video_codec: Option<String>,
    /// Audio codec, `"none"` when the stream has no audio
    #[serde(default)]
    pub audio_codec: Option<String>,
    /// Container extension
    pub extension: String,
    /// Exact size in bytes
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Estimated size in bytes
    #[serde(default)]
    pub file_size_approx: Option<u64>,
}

impl FormatRecord {
    /// Whether this encoding carries a video stream
    pub fn has_video(&self) -> bool {
        self.video_codec.as_deref() != Some("none")
    }

    /// Whether this encoding carries an audio stream
    pub fn has_audio(&self) -> bool {
        self.audio_codec.as_deref() != Some("none")
    }

    /// Exact size if known, otherwise the estimate
    pub fn size_hint(&self) -> Option<u64> {
        self.file_size.or(self.file_size_approx)
    }

    /// Whether the encoding can be fetched directly over HTTP(S) with range requests
    pub fn is_direct_http(&self) -> bool {
        let Some(url) = self.url.as_deref() else {
            return false;
        };
        let http_url = url.starts_with("https://") || url.starts_with("http://");
        let http_protocol = matches!(self.protocol.as_deref(), None | Some("https") | Some("http"));
        http_url && http_protocol
    }
}

/// Result of expanding a playlist into its entries
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    /// Playlist id
    pub id: Option<String>,
    /// Playlist title
    pub title: Option<String>,
    /// Entry URLs, in playlist order
    pub entries: Vec<String>,
}

/// Download task state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, not started
    Pending,
    /// Fetching metadata
    Extracting,
    /// Choosing an encoding
    Selecting,
    /// Already on disk
    Skipped,
    /// Moving bytes
    Transferring,
    /// Artifact written
    Completed,
    /// Terminal failure
    Failed,
}

impl TaskState {
    /// Whether no further transitions can follow
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Skipped | TaskState::Completed | TaskState::Failed
        )
    }
}

/// Per-video failure classes reported to collaborators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unrecognized source locator
    InvalidUrl,
    /// Metadata could not be fetched
    ExtractionFailed,
    /// No encoding carries video
    NoSuitableFormat,
    /// Segment or single-stream transfer failed
    TransferFailed,
    /// Container merge failed
    MergeFailed,
    /// Disk space exhausted
    InsufficientSpace,
    /// Run was cancelled
    Cancelled,
}

impl FailureKind {
    /// Short human-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            FailureKind::InvalidUrl => "invalid URL",
            FailureKind::ExtractionFailed => "extraction error",
            FailureKind::NoSuitableFormat => "no suitable format",
            FailureKind::TransferFailed => "transfer failed",
            FailureKind::MergeFailed => "merge failed",
            FailureKind::InsufficientSpace => "insufficient disk space",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Failure class plus the underlying message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Failure class
    pub kind: FailureKind,
    /// Underlying error message
    pub message: String,
}

impl From<&crate::error::Error> for FailureInfo {
    fn from(error: &crate::error::Error) -> Self {
        Self {
            kind: error.failure_kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Identity of the video a task is working on, attached to every event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoIdentity {
    /// Task id
    pub task: TaskId,
    /// URL as supplied by the caller
    pub url: String,
    /// Video id, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Title, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Final result of one download task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The video the task worked on
    pub video: VideoIdentity,
    /// Terminal state (Skipped, Completed or Failed)
    pub state: TaskState,
    /// Artifact path for completed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Size of the artifact in bytes (0 unless completed)
    pub bytes: u64,
    /// Failure details for failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl TaskOutcome {
    /// Completed and skipped tasks both count as success
    pub fn is_success(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Skipped)
    }
}

/// A URL that failed, with its reason
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// URL as supplied by the caller
    pub url: String,
    /// Failure class
    pub kind: FailureKind,
    /// Underlying error message
    pub message: String,
}

/// Point-in-time copy of run statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Number of URLs in the run
    pub total: u64,
    /// Tasks that wrote an artifact
    pub completed: u64,
    /// Tasks that failed (including dropped invalid items)
    pub failed: u64,
    /// Tasks skipped as already downloaded
    pub skipped: u64,
    /// Bytes of completed artifacts
    pub bytes_transferred: u64,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Seconds since the run started
    pub elapsed_secs: f64,
}

impl StatsSnapshot {
    /// Number of tasks in a terminal state
    pub fn settled(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }

    /// `completed / total * 100`, or 0 when total is 0
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    /// Bytes per second over the elapsed time
    pub fn throughput_bps(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.bytes_transferred as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    /// Videos handled (completed or skipped) per minute
    pub fn videos_per_minute(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            (self.completed + self.skipped) as f64 / self.elapsed_secs * 60.0
        } else {
            0.0
        }
    }
}

/// End-of-run report produced by the batch coordinator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Final counters
    pub stats: StatsSnapshot,
    /// `completed / total * 100`, 0 when total is 0
    pub success_rate: f64,
    /// Bytes per second over the whole run
    pub throughput_bps: f64,
    /// Completed plus skipped videos per minute
    pub videos_per_minute: f64,
    /// Failed URLs with their reasons, in completion order
    pub failures: Vec<FailedItem>,
}

impl BatchSummary {
    /// Build a summary from final statistics and collected failures
    pub fn new(stats: StatsSnapshot, failures: Vec<FailedItem>) -> Self {
        Self {
            success_rate: stats.success_rate(),
            throughput_bps: stats.throughput_bps(),
            videos_per_minute: stats.videos_per_minute(),
            stats,
            failures,
        }
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "Download statistics")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Completed:      {}", self.stats.completed)?;
        writeln!(f, "Skipped:        {}", self.stats.skipped)?;
        writeln!(f, "Failed:         {}", self.stats.failed)?;
        writeln!(f, "Total:          {}", self.stats.total)?;
        writeln!(f, "Success rate:   {:.1}%", self.success_rate)?;
        writeln!(
            f,
            "Downloaded:     {}",
            crate::utils::format_bytes(self.stats.bytes_transferred)
        )?;
        writeln!(f, "Elapsed:        {:.1}s", self.stats.elapsed_secs)?;
        writeln!(
            f,
            "Average speed:  {}/s",
            crate::utils::format_bytes(self.throughput_bps as u64)
        )?;
        writeln!(f, "Videos/minute:  {:.1}", self.videos_per_minute)?;
        if !self.failures.is_empty() {
            writeln!(f, "Failed URLs:")?;
            for item in &self.failures {
                writeln!(f, "  - {} ({}): {}", item.url, item.kind, item.message)?;
            }
        }
        write!(f, "{rule}")
    }
}

/// Event emitted by the downloader
///
/// Consumers subscribe via [`MediaDownloader::subscribe`](crate::MediaDownloader::subscribe).
/// Delivery is at-least-once per state transition, so handlers must be idempotent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A batch was accepted
    BatchStarted {
        /// Number of URLs in the batch
        total: usize,
    },

    /// A task moved to a new state
    StateChanged {
        /// The video the task is working on
        video: VideoIdentity,
        /// The new state
        state: TaskState,
        /// Failure details when the new state is Failed
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureInfo>,
    },

    /// Transfer progress update
    Progress {
        /// The video being transferred
        video: VideoIdentity,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Bytes downloaded so far
        downloaded_bytes: u64,
        /// Total bytes, 0 when unknown
        total_bytes: u64,
        /// Current speed in bytes per second
        speed_bps: u64,
        /// Estimated seconds remaining
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<u64>,
    },

    /// Artifact written to its final path
    Completed {
        /// The video that was downloaded
        video: VideoIdentity,
        /// Final artifact path
        path: PathBuf,
        /// Artifact size in bytes
        bytes: u64,
    },

    /// Periodic statistics snapshot during a batch
    Stats {
        /// Current counters
        stats: StatsSnapshot,
    },

    /// A playlist was expanded into entries
    PlaylistExpanded {
        /// Canonical playlist URL
        url: String,
        /// Playlist title
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Number of entries found
        entries: usize,
    },

    /// A batch finished
    BatchFinished {
        /// Final report
        summary: BatchSummary,
    },

    /// Downloader is shutting down
    Shutdown,
}
