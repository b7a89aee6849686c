//! Segmented, resumable transfer engine
//!
//! A resource is split into fixed-size byte ranges. Each range is streamed into
//! its own file under `.{stem}_chunks/` next to the output; a segment file with
//! the exact expected length is treated as done, which is what makes an
//! interrupted transfer resumable. Once every segment is present they are
//! concatenated in offset order into the output and the temp directory is removed.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::traits::{ByteStream, Transport};
use crate::config::TransferConfig;
use crate::error::{Error, Result, TransferError};
use crate::utils::partial_path;

/// One byte range of a chunked transfer (`start..=end`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSegment {
    /// Position in the merged file
    pub index: usize,
    /// First byte offset
    pub start: u64,
    /// Last byte offset, inclusive
    pub end: u64,
}

impl ChunkSegment {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a planned segment covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Cumulative progress of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes present so far (reused segments included)
    pub downloaded_bytes: u64,
    /// Total size, 0 when unknown
    pub total_bytes: u64,
}

/// What a finished transfer did
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Size of the final artifact
    pub bytes_written: u64,
    /// Bytes actually fetched over the transport during this call
    pub bytes_fetched: u64,
    /// Number of segments in the plan (1 for single-stream transfers)
    pub segments_total: usize,
    /// Segments found complete on disk and not fetched again
    pub segments_reused: usize,
    /// Whether the ranged path was used
    pub chunked: bool,
}

/// Split `[0, total)` into consecutive segments of `chunk_size` bytes
///
/// The last segment may be shorter. An empty resource has no segments.
///
/// # Examples
///
/// ```
/// use media_dl::transfer::plan_segments;
///
/// let segments = plan_segments(25, 10);
/// let lengths: Vec<u64> = segments.iter().map(|s| s.len()).collect();
/// assert_eq!(lengths, vec![10, 10, 5]);
/// ```
pub fn plan_segments(total: u64, chunk_size: u64) -> Vec<ChunkSegment> {
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let mut segments = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total) - 1;
        segments.push(ChunkSegment {
            index: segments.len(),
            start,
            end,
        });
        start = end + 1;
    }
    segments
}

/// Temp directory holding the segments of `output`: `{parent}/.{stem}_chunks`
pub fn segment_dir(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{stem}_chunks"))
}

/// File holding segment `index`: `chunk_0000`, `chunk_0001`, ...
pub fn segment_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("chunk_{index:04}"))
}

/// Segmented downloader over any [`Transport`]
pub struct ChunkedTransfer {
    transport: Arc<dyn Transport>,
    chunk_size: u64,
    max_in_flight: usize,
    idle_timeout: Duration,
}

impl ChunkedTransfer {
    /// Create an engine using the configured chunk size, parallelism and timeout
    pub fn new(transport: Arc<dyn Transport>, config: &TransferConfig) -> Self {
        Self {
            transport,
            chunk_size: config.chunk_size.max(1),
            max_in_flight: config.max_segments_in_flight.max(1),
            idle_timeout: config.request_timeout,
        }
    }

    /// Name of the underlying transport
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Download `url` into `output`
    ///
    /// Uses ranged segments when the server supports them and reports a size;
    /// otherwise streams the body sequentially. On failure, completed segment
    /// files stay on disk so the next call only fetches what is missing.
    pub async fn download(
        &self,
        url: &str,
        output: &Path,
        progress: Option<mpsc::Sender<TransferProgress>>,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let probe = self.transport.probe(url).await?;
        tracing::debug!(
            url = %url,
            total_size = probe.total_size,
            supports_ranges = probe.supports_ranges,
            transport = self.transport.name(),
            "Probed remote resource"
        );

        if !probe.supports_ranges || probe.total_size == 0 {
            return self
                .single_stream(url, output, probe.total_size, progress.as_ref(), cancel)
                .await;
        }

        self.segmented(url, output, probe.total_size, progress.as_ref(), cancel)
            .await
    }

    async fn segmented(
        &self,
        url: &str,
        output: &Path,
        total: u64,
        progress: Option<&mpsc::Sender<TransferProgress>>,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let segments = plan_segments(total, self.chunk_size);
        let dir = segment_dir(output);
        tokio::fs::create_dir_all(&dir).await?;

        let mut downloaded = 0u64;
        let mut pending = Vec::new();
        for segment in &segments {
            let path = segment_path(&dir, segment.index);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() == segment.len() => downloaded += segment.len(),
                _ => pending.push(*segment),
            }
        }
        let segments_reused = segments.len() - pending.len();

        tracing::info!(
            url = %url,
            total_bytes = total,
            segments = segments.len(),
            reused = segments_reused,
            "Starting chunked transfer"
        );
        report(progress, downloaded, total);

        let mut fetched = 0u64;
        let mut results = futures::stream::iter(pending)
            .map(|segment| self.fetch_segment(url, &dir, segment, cancel))
            .buffer_unordered(self.max_in_flight);

        while let Some(result) = results.next().await {
            let bytes = result?;
            fetched += bytes;
            downloaded += bytes;
            report(progress, downloaded, total);
        }
        drop(results);

        let bytes_written = merge_segments(&dir, &segments, output).await?;
        if bytes_written != total {
            return Err(TransferError::SizeMismatch {
                path: output.to_path_buf(),
                expected: total,
                actual: bytes_written,
            }
            .into());
        }

        tracing::info!(
            url = %url,
            path = %output.display(),
            bytes = bytes_written,
            "Chunked transfer complete"
        );

        Ok(TransferReport {
            bytes_written,
            bytes_fetched: fetched,
            segments_total: segments.len(),
            segments_reused,
            chunked: true,
        })
    }

    /// Stream one segment into its file, returning the bytes written
    async fn fetch_segment(
        &self,
        url: &str,
        dir: &Path,
        segment: ChunkSegment,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let path = segment_path(dir, segment.index);

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.fetch_segment_body(url, &path, segment) => result,
        };

        match result {
            Ok(written) => {
                tracing::debug!(url = %url, index = segment.index, bytes = written, "Segment complete");
                Ok(written)
            }
            Err(e) => {
                tracing::warn!(url = %url, index = segment.index, error = %e, "Segment failed");
                Err(TransferError::Segment {
                    index: segment.index,
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    /// Sequential download for servers without range support or size
    async fn single_stream(
        &self,
        url: &str,
        output: &Path,
        total: u64,
        progress: Option<&mpsc::Sender<TransferProgress>>,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        tracing::info!(url = %url, total_bytes = total, "Starting single-stream transfer");
        let partial = partial_path(output);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.stream_to_partial(url, &partial, total, progress) => result,
        };

        let written = match result {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::debug!(path = %partial.display(), error = %cleanup, "No partial file to remove");
                }
                return Err(e);
            }
        };

        if total > 0 && written != total {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                tracing::debug!(path = %partial.display(), error = %cleanup, "Failed to remove short partial file");
            }
            return Err(TransferError::SizeMismatch {
                path: output.to_path_buf(),
                expected: total,
                actual: written,
            }
            .into());
        }

        tokio::fs::rename(&partial, output).await?;

        Ok(TransferReport {
            bytes_written: written,
            bytes_fetched: written,
            segments_total: 1,
            segments_reused: 0,
            chunked: false,
        })
    }

    async fn fetch_segment_body(&self, url: &str, path: &Path, segment: ChunkSegment) -> Result<u64> {
        let stream = self
            .timed(url, self.transport.fetch_range(url, segment.start, segment.end))
            .await??;
        let written = self.write_stream(url, stream, path).await?;
        if written != segment.len() {
            return Err(TransferError::SizeMismatch {
                path: path.to_path_buf(),
                expected: segment.len(),
                actual: written,
            }
            .into());
        }
        Ok(written)
    }

    async fn stream_to_partial(
        &self,
        url: &str,
        partial: &Path,
        total: u64,
        progress: Option<&mpsc::Sender<TransferProgress>>,
    ) -> Result<u64> {
        let mut stream = self.timed(url, self.transport.fetch(url)).await??;
        let mut file = tokio::fs::File::create(partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk(url, &mut stream).await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            report(progress, written, total);
        }
        file.flush().await?;
        Ok(written)
    }

    async fn write_stream(&self, url: &str, mut stream: ByteStream, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk(url, &mut stream).await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Next body chunk, failing if nothing arrives within the idle timeout
    async fn next_chunk(&self, url: &str, stream: &mut ByteStream) -> Result<Option<bytes::Bytes>> {
        match self.timed(url, stream.next()).await? {
            Some(chunk) => chunk.map(Some),
            None => Ok(None),
        }
    }

    async fn timed<F: std::future::Future>(&self, url: &str, future: F) -> Result<F::Output> {
        tokio::time::timeout(self.idle_timeout, future)
            .await
            .map_err(|_| {
                Error::from(TransferError::Timeout {
                    url: url.to_string(),
                    after_secs: self.idle_timeout.as_secs(),
                })
            })
    }
}

/// Concatenate segment files in index order, then remove them and their directory
async fn merge_segments(dir: &Path, segments: &[ChunkSegment], output: &Path) -> Result<u64> {
    let partial = partial_path(output);
    let mut out = tokio::fs::File::create(&partial).await?;
    let mut written = 0u64;

    for segment in segments {
        let mut input = tokio::fs::File::open(segment_path(dir, segment.index)).await?;
        written += tokio::io::copy(&mut input, &mut out).await?;
    }
    out.flush().await?;
    drop(out);

    tokio::fs::rename(&partial, output).await?;

    for segment in segments {
        let path = segment_path(dir, segment.index);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove segment file");
        }
    }
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        tracing::warn!(path = %dir.display(), error = %e, "Failed to remove segment directory");
    }

    Ok(written)
}

/// Progress reports never block or fail the transfer
fn report(progress: Option<&mpsc::Sender<TransferProgress>>, downloaded_bytes: u64, total_bytes: u64) {
    if let Some(tx) = progress {
        tx.try_send(TransferProgress {
            downloaded_bytes,
            total_bytes,
        })
        .ok();
    }
}
