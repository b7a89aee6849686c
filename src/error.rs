//! Error types for media-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (extraction, transfer, configuration, etc.)
//! - Machine-readable error codes for collaborators (GUI, web, CLI)
//! - Mapping onto the per-video failure taxonomy reported in events and summaries

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{BatchSummary, FailureKind};

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Source locator could not be recognized or parsed
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The raw input as supplied by the caller
        url: String,
        /// Why the input was rejected
        reason: String,
    },

    /// Metadata extraction failed
    #[error("extraction failed for {url}: {kind}: {message}")]
    Extraction {
        /// Canonical URL that was being extracted
        url: String,
        /// Classified failure cause
        kind: ExtractionFailure,
        /// Raw message reported by the backend
        message: String,
    },

    /// No encoding of the video carries a video stream
    #[error("no suitable format for {video}")]
    NoSuitableFormat {
        /// Video id or title
        video: String,
    },

    /// Transfer-related error
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Container merge or post-processing step failed
    #[error("merge failed for {path}: {reason}")]
    Merge {
        /// The artifact that was being produced
        path: PathBuf,
        /// The reason the merge failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Work was cancelled before it could finish
    #[error("cancelled")]
    Cancelled,

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// A batch stopped early because of a resource-exhaustion failure
    #[error("batch aborted: {reason}")]
    BatchAborted {
        /// The failure that stopped the batch
        reason: String,
        /// Statistics and failures gathered before the batch stopped
        summary: Box<BatchSummary>,
    },

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Classified cause of a metadata extraction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// DNS failure, connection reset, timeout or similar transient problem
    Network,
    /// The remote site is throttling requests (HTTP 429)
    RateLimited,
    /// The video was removed, is private or never existed
    NotFound,
    /// The remote site refused access (HTTP 403, sign-in required)
    AccessDenied,
    /// The extractor could not understand the page
    Unsupported,
    /// The extraction tool failed for another reason
    Tool,
}

impl ExtractionFailure {
    /// Whether this failure class is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractionFailure::Network | ExtractionFailure::RateLimited)
    }
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ExtractionFailure::Network => "network error",
            ExtractionFailure::RateLimited => "rate limited",
            ExtractionFailure::NotFound => "video not found",
            ExtractionFailure::AccessDenied => "access denied",
            ExtractionFailure::Unsupported => "extraction error",
            ExtractionFailure::Tool => "extractor error",
        };
        f.write_str(text)
    }
}

/// Transfer errors (probe, ranged fetch, segment assembly, backend download)
#[derive(Debug, Error)]
pub enum TransferError {
    /// Server answered with a status that is neither success nor partial content
    #[error("unexpected HTTP status {status} from {url}")]
    BadStatus {
        /// The requested URL
        url: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// No data arrived within the configured request timeout
    #[error("timed out after {after_secs}s waiting for {url}")]
    Timeout {
        /// The requested URL
        url: String,
        /// The timeout that elapsed, in seconds
        after_secs: u64,
    },

    /// One segment of a chunked transfer failed
    #[error("segment {index} failed: {source}")]
    Segment {
        /// Zero-based segment index
        index: usize,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A written file does not have the expected length
    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The file that was written
        path: PathBuf,
        /// The expected number of bytes
        expected: u64,
        /// The number of bytes actually written
        actual: u64,
    },

    /// The extraction backend failed while downloading on our behalf
    #[error("backend download failed: {reason}")]
    Backend {
        /// Message reported by the backend
        reason: String,
    },
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::Extraction { .. } => "extraction_failed",
            Error::NoSuitableFormat { .. } => "no_suitable_format",
            Error::Transfer(e) => match e {
                TransferError::BadStatus { .. } => "bad_status",
                TransferError::Timeout { .. } => "timeout",
                TransferError::Segment { .. } => "segment_failed",
                TransferError::SizeMismatch { .. } => "size_mismatch",
                TransferError::Backend { .. } => "backend_download_failed",
            },
            Error::Merge { .. } => "merge_failed",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Cancelled => "cancelled",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::BatchAborted { .. } => "batch_aborted",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }

    /// Map this error onto the per-video failure taxonomy
    ///
    /// Anything that happens while moving bytes (network, I/O, tool failures) is a
    /// transfer failure; the remaining classes map one to one.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::InvalidUrl { .. } => FailureKind::InvalidUrl,
            Error::Extraction { .. } => FailureKind::ExtractionFailed,
            Error::NoSuitableFormat { .. } => FailureKind::NoSuitableFormat,
            Error::Merge { .. } => FailureKind::MergeFailed,
            Error::Cancelled | Error::ShuttingDown => FailureKind::Cancelled,
            Error::Transfer(TransferError::Segment { source, .. }) => match source.failure_kind()
            {
                FailureKind::InsufficientSpace => FailureKind::InsufficientSpace,
                FailureKind::Cancelled => FailureKind::Cancelled,
                _ => FailureKind::TransferFailed,
            },
            _ if self.is_fatal() => FailureKind::InsufficientSpace,
            _ => FailureKind::TransferFailed,
        }
    }

    /// Whether this error is a resource-exhaustion failure that should stop a whole batch
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InsufficientSpace { .. } => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::StorageFull,
            Error::Transfer(TransferError::Segment { source, .. }) => source.is_fatal(),
            _ => false,
        }
    }

    /// Re-tag an error raised while extracting metadata for `url`
    ///
    /// Classified extraction errors, invalid URLs and cancellation pass through.
    /// Anything else (unparseable tool output, a tool that failed to start) becomes
    /// an [`ExtractionFailure::Tool`] so it is reported as an extraction failure.
    pub fn during_extraction(self, url: &str) -> Error {
        match self {
            Error::Extraction { .. }
            | Error::InvalidUrl { .. }
            | Error::Cancelled
            | Error::ShuttingDown => self,
            other => Error::Extraction {
                url: url.to_string(),
                kind: ExtractionFailure::Tool,
                message: other.to_string(),
            },
        }
    }
}
