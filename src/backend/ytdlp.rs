//! yt-dlp process backend

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::parse::{
    extraction_error, is_merge_failure, last_error_line, parse_playlist_json, parse_progress_line,
    parse_video_json, progress_template,
};
use super::traits::{BackendDownload, ExtractionBackend};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result, TransferError};
use crate::transfer::TransferProgress;
use crate::types::{PlaylistInfo, VideoRecord};

/// Backend driving the external `yt-dlp` binary
///
/// # Examples
///
/// ```no_run
/// use media_dl::backend::{ExtractionBackend, YtDlpBackend};
/// use media_dl::config::ExtractorConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = YtDlpBackend::from_path(ExtractorConfig::default())
///     .expect("yt-dlp not found in PATH");
/// let record = backend
///     .extract_info("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
///     .await?;
/// println!("{} has {} formats", record.title, record.formats.len());
/// # Ok(())
/// # }
/// ```
pub struct YtDlpBackend {
    binary_path: PathBuf,
    config: ExtractorConfig,
}

impl YtDlpBackend {
    /// Create a backend with an explicit binary path
    pub fn new(binary_path: PathBuf, config: ExtractorConfig) -> Self {
        Self {
            binary_path,
            config,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path(config: ExtractorConfig) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|path| Self::new(path, config))
    }

    /// Resolve the binary from configuration (explicit path first, then PATH)
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        if let Some(path) = &config.binary_path {
            return Ok(Self::new(path.clone(), config.clone()));
        }
        if config.search_path
            && let Some(backend) = Self::from_path(config.clone())
        {
            return Ok(backend);
        }
        Err(Error::NotSupported(
            "yt-dlp binary not found; set extractor.binary_path or install yt-dlp".to_string(),
        ))
    }

    /// Path of the binary this backend runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--no-warnings")
            .arg("--socket-timeout")
            .arg(self.config.socket_timeout.as_secs().to_string())
            .arg("--retries")
            .arg(self.config.retries.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run_json(&self, url: &str, args: &[&str]) -> Result<Vec<u8>> {
        let output = self
            .command()
            .args(args)
            .arg(url)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                url = %url,
                status = ?output.status.code(),
                error = %last_error_line(&stderr),
                "yt-dlp extraction failed"
            );
            return Err(extraction_error(url, &stderr));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    async fn extract_info(&self, url: &str) -> Result<VideoRecord> {
        let stdout = self
            .run_json(url, &["--dump-json", "--no-playlist", "--skip-download"])
            .await
            .map_err(|e| e.during_extraction(url))?;
        parse_video_json(url, &stdout).map_err(|e| e.during_extraction(url))
    }

    async fn expand_playlist(&self, url: &str) -> Result<PlaylistInfo> {
        let stdout = self
            .run_json(url, &["--flat-playlist", "--dump-single-json"])
            .await
            .map_err(|e| e.during_extraction(url))?;
        parse_playlist_json(&stdout).map_err(|e| e.during_extraction(url))
    }

    async fn download(
        &self,
        request: &BackendDownload,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<PathBuf> {
        let template = format!("{}.%(ext)s", request.output_stem.display());

        let mut child = self
            .command()
            .arg("-f")
            .arg(&request.format_selector)
            .arg("-o")
            .arg(&template)
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--progress")
            .arg("--progress-template")
            .arg(progress_template())
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--merge-output-format")
            .arg(&request.merge_output_format)
            .arg("--concurrent-fragments")
            .arg(self.config.concurrent_fragments.to_string())
            .arg("--fragment-retries")
            .arg(self.config.retries.to_string())
            .arg(&request.url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr unavailable".to_string()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.ok();
            buf
        });

        let mut final_path = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(update) = parse_progress_line(&line) {
                if let Some(tx) = &progress {
                    tx.try_send(update).ok();
                }
                continue;
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('[') {
                final_path = Some(PathBuf::from(trimmed));
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            let reason = last_error_line(&stderr);
            tracing::warn!(url = %request.url, error = %reason, "yt-dlp download failed");
            if is_merge_failure(&stderr) {
                return Err(Error::Merge {
                    path: request.output_stem.clone(),
                    reason,
                });
            }
            return Err(TransferError::Backend { reason }.into());
        }

        match final_path {
            Some(path) => Ok(path),
            None => Err(TransferError::Backend {
                reason: "yt-dlp did not report an output file".to_string(),
            }
            .into()),
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
