//! Metadata extraction and backend-managed downloads
//!
//! The [`ExtractionBackend`] trait is the seam between the orchestrator and the
//! tool that knows how to talk to video sites. [`YtDlpBackend`] drives the
//! `yt-dlp` binary as an async subprocess.

mod parse;
mod traits;
mod ytdlp;

pub use parse::{classify_failure, parse_playlist_json, parse_progress_line, parse_video_json};
pub use traits::{BackendDownload, ExtractionBackend};
pub use ytdlp::YtDlpBackend;
