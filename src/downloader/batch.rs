//! Single, batch and playlist entry points.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::canonical::MediaLocator;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::stats::RunStatistics;
use crate::types::{
    BatchSummary, Event, FailedItem, FailureInfo, FailureKind, TaskOutcome, TaskState,
    VideoIdentity, VideoRecord,
};

use super::MediaDownloader;
use super::background_tasks::{StatsReporterParams, spawn_stats_reporter};
use super::download_task::run_download_task;

/// Result of the metadata prefetch for one batch item
enum Prefetched {
    /// Metadata is in hand; the task skips extraction
    Ready(VideoRecord),
    /// Let the task decide (already on disk, or the batch was cancelled)
    Deferred,
    /// Dropped from the batch and counted as failed
    Invalid(Error),
}

impl MediaDownloader {
    /// Download a single video
    ///
    /// Per-video failures are reported in the returned [`TaskOutcome`], not as
    /// an `Err`. Extraction is attempted once; callers that want retries wrap
    /// this call themselves.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has been called.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// # async fn example() -> media_dl::Result<()> {
    /// let downloader = MediaDownloader::new(Config::default()).await?;
    /// let outcome = downloader.download_one("https://youtu.be/dQw4w9WgXcQ").await?;
    /// println!("{:?} -> {:?}", outcome.state, outcome.path);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download_one(&self, url: &str) -> Result<TaskOutcome> {
        self.ensure_accepting()?;
        let stats = Arc::new(RunStatistics::new(1));
        let parent = self.run_token().await;
        let ctx = self.task_context(url, stats, &parent).await;
        Ok(run_download_task(ctx, None).await)
    }

    /// Download every URL and report aggregate statistics
    ///
    /// Metadata for all items is fetched first (bounded by the shared permit
    /// pool, with retries for transient failures); invalid items are dropped and
    /// counted as failed. The remaining items then run concurrently and their
    /// results are consumed in completion order.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] if the downloader no longer accepts work
    /// - [`Error::BatchAborted`] when a task runs out of disk space; the partial
    ///   summary is attached and the remaining tasks are cancelled
    pub async fn download_batch<I, S>(&self, urls: I) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_accepting()?;
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();

        let stats = Arc::new(RunStatistics::new(urls.len() as u64));
        let batch_token = self.run_token().await.child_token();
        tracing::info!(total = urls.len(), "Starting batch");
        self.emit_event(Event::BatchStarted { total: urls.len() });

        let reporter_token = batch_token.child_token();
        let reporter = spawn_stats_reporter(StatsReporterParams {
            stats: stats.clone(),
            event_tx: self.event_tx.clone(),
            interval: self.config.download.stats_interval,
            cancel_token: reporter_token.clone(),
        });

        let prefetched =
            futures::future::join_all(urls.iter().map(|url| self.prefetch(url, &batch_token)))
                .await;

        let mut failures = Vec::new();
        let mut running = FuturesUnordered::new();

        for (url, item) in urls.into_iter().zip(prefetched) {
            let record = match item {
                Prefetched::Ready(record) => Some(record),
                Prefetched::Deferred => None,
                Prefetched::Invalid(error) => {
                    failures.push(self.drop_invalid(&url, &error, &stats));
                    continue;
                }
            };

            let ctx = self.task_context(&url, stats.clone(), &batch_token).await;
            let handle = tokio::spawn(run_download_task(ctx, record));
            running.push(async move { (url, handle.await) });
        }

        let mut abort_reason = None;
        while let Some((url, joined)) = running.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Download task panicked");
                    stats.record_failed();
                    failures.push(FailedItem {
                        url,
                        kind: FailureKind::TransferFailed,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let Some(failure) = outcome.failure else {
                continue;
            };
            if failure.kind == FailureKind::InsufficientSpace && abort_reason.is_none() {
                tracing::error!(url = %url, error = %failure.message, "Aborting batch");
                abort_reason = Some(failure.message.clone());
                batch_token.cancel();
            }
            failures.push(FailedItem {
                url,
                kind: failure.kind,
                message: failure.message,
            });
        }

        reporter_token.cancel();
        if let Err(e) = reporter.await {
            tracing::debug!(error = %e, "Statistics reporter ended abnormally");
        }

        let summary = BatchSummary::new(stats.snapshot(), failures);
        tracing::info!(
            completed = summary.stats.completed,
            skipped = summary.stats.skipped,
            failed = summary.stats.failed,
            total = summary.stats.total,
            success_rate = summary.success_rate,
            bytes = summary.stats.bytes_transferred,
            elapsed_secs = summary.stats.elapsed_secs,
            "Batch finished"
        );
        self.emit_event(Event::BatchFinished {
            summary: summary.clone(),
        });

        match abort_reason {
            Some(reason) => Err(Error::BatchAborted {
                reason,
                summary: Box::new(summary),
            }),
            None => Ok(summary),
        }
    }

    /// Expand a playlist and download its entries as one batch
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] when `url` does not name a playlist, the backend's
    /// error when expansion fails after retries, and anything
    /// [`download_batch`](Self::download_batch) returns.
    pub async fn download_playlist(&self, url: &str) -> Result<BatchSummary> {
        self.ensure_accepting()?;
        let locator = MediaLocator::parse(url)?;
        if !locator.is_playlist() {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
                reason: "not a playlist URL".to_string(),
            });
        }

        let canonical = locator.canonical_url();
        let canonical = canonical.as_str();
        let backend = &self.services.backend;
        let playlist = retry_with_backoff(&self.config.retry, || {
            backend.expand_playlist(canonical)
        })
        .await?;

        tracing::info!(
            url = %canonical,
            title = playlist.title.as_deref().unwrap_or_default(),
            entries = playlist.entries.len(),
            "Playlist expanded"
        );
        self.emit_event(Event::PlaylistExpanded {
            url: canonical.to_string(),
            title: playlist.title.clone(),
            entries: playlist.entries.len(),
        });

        self.download_batch(playlist.entries).await
    }

    /// Fetch metadata for one batch item ahead of its task
    async fn prefetch(&self, url: &str, cancel: &CancellationToken) -> Prefetched {
        let locator = match MediaLocator::parse(url) {
            Ok(locator) if locator.is_playlist() => {
                return Prefetched::Invalid(Error::InvalidUrl {
                    url: url.to_string(),
                    reason: "playlist URLs must be expanded first".to_string(),
                });
            }
            Ok(locator) => locator,
            Err(e) => return Prefetched::Invalid(e),
        };
        let video_id = locator.id();

        if self
            .services
            .duplicates
            .is_downloaded(Some(video_id), "")
            .await
        {
            return Prefetched::Deferred;
        }
        if let Some(record) = self.services.cache.get(video_id).await {
            return Prefetched::Ready(record);
        }

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Prefetched::Deferred,
            permit = self.run_state.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Prefetched::Deferred,
            },
        };

        let canonical = locator.canonical_url();
        let canonical = canonical.as_str();
        let backend = &self.services.backend;
        let extracted = tokio::select! {
            _ = cancel.cancelled() => return Prefetched::Deferred,
            result = retry_with_backoff(&self.config.retry, || backend.extract_info(canonical)) => result,
        };

        match extracted {
            Ok(record) => {
                if let Err(e) = self.services.cache.set(video_id, record.clone()).await {
                    tracing::warn!(video_id = %video_id, error = %e, "Failed to persist metadata cache");
                }
                Prefetched::Ready(record)
            }
            Err(Error::Cancelled) => Prefetched::Deferred,
            Err(e) => Prefetched::Invalid(e.during_extraction(canonical)),
        }
    }

    /// Count an item that never reached a task as failed and report it
    fn drop_invalid(&self, url: &str, error: &Error, stats: &RunStatistics) -> FailedItem {
        let failure = FailureInfo::from(error);
        tracing::warn!(url = %url, kind = %failure.kind, error = %error, "Dropping batch item");
        stats.record_failed();

        let video = VideoIdentity {
            task: self.allocate_task_id(),
            url: url.to_string(),
            video_id: MediaLocator::parse(url)
                .ok()
                .map(|locator| locator.id().to_string()),
            title: None,
        };
        self.emit_event(Event::StateChanged {
            video,
            state: TaskState::Failed,
            failure: Some(failure.clone()),
        });

        FailedItem {
            url: url.to_string(),
            kind: failure.kind,
            message: failure.message,
        }
    }
}
