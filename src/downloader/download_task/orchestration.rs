//! Download task orchestration: top-level lifecycle for a single video.

use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::backend::BackendDownload;
use crate::canonical::MediaLocator;
use crate::error::{Error, Result};
use crate::format_selector::{self, Selection};
use crate::retry::{IsRetryable, backoff_delay};
use crate::types::{TaskOutcome, TaskState, VideoIdentity, VideoRecord};
use crate::utils::{artifact_path, ensure_free_space};

use super::super::background_tasks::{
    PROGRESS_CHANNEL_CAPACITY, ProgressForwarderParams, spawn_progress_forwarder,
};
use super::context::TaskContext;
use super::finalization::finish_download;

/// How the pipeline ended when it did not fail
pub(super) enum Finished {
    Skipped,
    Completed { path: PathBuf, bytes: u64 },
}

/// Core download task -- runs one video through the state machine.
///
/// Phases:
/// 1. Normalize the URL and check the duplicate index by id (no network)
/// 2. Use prefetched or cached metadata, or extract it live
/// 3. Check the duplicate index by title
/// 4. Select a format and check free space
/// 5. Transfer, retrying transient failures and resuming segments
/// 6. Record the artifact
///
/// Never returns an error: every failure becomes a `Failed` outcome.
pub(crate) async fn run_download_task(
    ctx: TaskContext,
    prefetched: Option<VideoRecord>,
) -> TaskOutcome {
    let mut video = ctx.initial_identity();
    ctx.emit_state(&video, TaskState::Pending, None);

    let result = match ctx.acquire_permit().await {
        Ok(_permit) => execute(&ctx, &mut video, prefetched).await,
        Err(e) => Err(e),
    };
    ctx.remove_from_active().await;

    match result {
        Ok(Finished::Skipped) => ctx.skipped(video),
        Ok(Finished::Completed { path, bytes }) => ctx.completed(video, path, bytes),
        Err(e) => ctx.failed(video, &e),
    }
}

async fn execute(
    ctx: &TaskContext,
    video: &mut VideoIdentity,
    prefetched: Option<VideoRecord>,
) -> Result<Finished> {
    ctx.check_cancelled()?;

    let locator = MediaLocator::parse(&ctx.url)?;
    if locator.is_playlist() {
        return Err(Error::InvalidUrl {
            url: ctx.url.clone(),
            reason: "playlist URLs must be expanded first".to_string(),
        });
    }
    let video_id = locator.id().to_string();
    let canonical = locator.canonical_url();
    video.video_id = Some(video_id.clone());

    let duplicates = &ctx.services.duplicates;
    if duplicates.is_downloaded(Some(&video_id), "").await {
        return Ok(Finished::Skipped);
    }

    let known = match prefetched {
        Some(record) => Some(record),
        None => ctx.services.cache.get(&video_id).await,
    };

    let record = match known {
        Some(record) => record,
        None => {
            ctx.emit_state(video, TaskState::Extracting, None);
            let record = tokio::select! {
                _ = ctx.cancel_token.cancelled() => return Err(Error::Cancelled),
                result = ctx.services.backend.extract_info(&canonical) => {
                    result.map_err(|e| e.during_extraction(&canonical))?
                }
            };
            if let Err(e) = ctx.services.cache.set(&video_id, record.clone()).await {
                tracing::warn!(video_id = %video_id, error = %e, "Failed to persist metadata cache");
            }
            record
        }
    };
    video.title = Some(record.title.clone());

    if duplicates.is_downloaded(Some(&video_id), &record.title).await {
        return Ok(Finished::Skipped);
    }

    ctx.emit_state(video, TaskState::Selecting, None);
    let selection = format_selector::select(&record.formats, ctx.config.download.max_height)
        .ok_or_else(|| Error::NoSuitableFormat {
            video: video_id.clone(),
        })?;
    tracing::debug!(
        video_id = %video_id,
        format_id = %selection.format.format_id,
        needs_audio_merge = selection.needs_audio_merge,
        "Format selected"
    );

    if let Some(size) = selection.format.size_hint() {
        ensure_free_space(ctx.config.download_dir(), size, &ctx.config.disk_space)?;
    }

    ctx.check_cancelled()?;
    ctx.emit_state(video, TaskState::Transferring, None);
    let stem = record.artifact_stem();
    let (path, bytes) = transfer_with_retry(ctx, video, &canonical, &selection, &stem).await?;

    finish_download(ctx, &record, &stem, &path, bytes).await;
    Ok(Finished::Completed { path, bytes })
}

/// Retry transient transfer failures; completed segments are reused on each attempt
async fn transfer_with_retry(
    ctx: &TaskContext,
    video: &VideoIdentity,
    canonical: &str,
    selection: &Selection,
    stem: &str,
) -> Result<(PathBuf, u64)> {
    let retry = &ctx.config.retry;
    let mut attempts_remaining = retry.max_retries;
    let mut attempt = 0;

    loop {
        match transfer_once(ctx, video, canonical, selection, stem).await {
            Ok(done) => return Ok(done),
            Err(e) if attempts_remaining > 0 && e.is_retryable() && !e.is_fatal() => {
                let delay = backoff_delay(retry, attempt);
                tracing::warn!(
                    task_id = ctx.id.0,
                    url = %canonical,
                    attempt = attempt + 1,
                    attempts_remaining,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transfer failed, retrying"
                );
                attempts_remaining -= 1;
                attempt += 1;
                tokio::select! {
                    _ = ctx.cancel_token.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

async fn transfer_once(
    ctx: &TaskContext,
    video: &VideoIdentity,
    canonical: &str,
    selection: &Selection,
    stem: &str,
) -> Result<(PathBuf, u64)> {
    ctx.check_cancelled()?;

    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let forwarder = spawn_progress_forwarder(ProgressForwarderParams {
        video: video.clone(),
        event_tx: ctx.event_tx.clone(),
        progress_rx,
    });

    let direct_url = selection
        .format
        .url
        .as_deref()
        .filter(|_| !selection.needs_audio_merge && selection.format.is_direct_http());

    let result = match direct_url {
        Some(url) => {
            let output = artifact_path(
                ctx.config.download_dir(),
                stem,
                &selection.format.extension,
            );
            ctx.services
                .transfer
                .download(url, &output, Some(progress_tx), &ctx.cancel_token)
                .await
                .map(|report| (output, report.bytes_written))
        }
        None => backend_download(ctx, canonical, selection, stem, progress_tx).await,
    };

    // The sender is gone, so the forwarder drains and exits
    if let Err(e) = forwarder.await {
        tracing::debug!(error = %e, "Progress forwarder ended abnormally");
    }
    result
}

async fn backend_download(
    ctx: &TaskContext,
    canonical: &str,
    selection: &Selection,
    stem: &str,
    progress_tx: mpsc::Sender<crate::transfer::TransferProgress>,
) -> Result<(PathBuf, u64)> {
    let request = BackendDownload {
        url: canonical.to_string(),
        format_selector: selection.format_selector(),
        output_stem: ctx.config.download_dir().join(stem),
        merge_output_format: ctx.config.extractor.merge_output_format.clone(),
    };

    let path = tokio::select! {
        _ = ctx.cancel_token.cancelled() => return Err(Error::Cancelled),
        result = ctx.services.backend.download(&request, Some(progress_tx)) => result?,
    };
    let bytes = tokio::fs::metadata(&path).await?.len();
    Ok((path, bytes))
}
