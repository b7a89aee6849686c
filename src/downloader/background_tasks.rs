//! Background tasks for progress forwarding and periodic statistics.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::stats::RunStatistics;
use crate::transfer::TransferProgress;
use crate::types::{Event, VideoIdentity};

/// Buffer size for the transfer progress channel
pub(crate) const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Parameters for spawning a progress forwarder background task
pub(crate) struct ProgressForwarderParams {
    /// The video being transferred
    pub video: VideoIdentity,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Progress reports from the transfer engine or backend
    pub progress_rx: mpsc::Receiver<TransferProgress>,
}

/// Spawn a task that turns raw transfer progress into `Progress` events.
///
/// Exits once every sender has been dropped.
pub(crate) fn spawn_progress_forwarder(
    params: ProgressForwarderParams,
) -> tokio::task::JoinHandle<()> {
    let ProgressForwarderParams {
        video,
        event_tx,
        mut progress_rx,
    } = params;

    tokio::spawn(async move {
        let started = Instant::now();
        // Bytes already on disk when the first report arrived (resumed segments)
        let mut baseline = None;

        while let Some(update) = progress_rx.recv().await {
            let base = *baseline.get_or_insert(update.downloaded_bytes);
            let fresh = update.downloaded_bytes.saturating_sub(base);

            let elapsed_secs = started.elapsed().as_secs_f64();
            let speed_bps = if elapsed_secs > 0.0 {
                (fresh as f64 / elapsed_secs) as u64
            } else {
                0
            };

            let percent = if update.total_bytes > 0 {
                (update.downloaded_bytes as f32 / update.total_bytes as f32 * 100.0).min(100.0)
            } else {
                0.0
            };

            let eta_seconds = (speed_bps > 0 && update.total_bytes > update.downloaded_bytes)
                .then(|| (update.total_bytes - update.downloaded_bytes) / speed_bps);

            event_tx
                .send(Event::Progress {
                    video: video.clone(),
                    percent,
                    downloaded_bytes: update.downloaded_bytes,
                    total_bytes: update.total_bytes,
                    speed_bps,
                    eta_seconds,
                })
                .ok();
        }
    })
}

/// Parameters for spawning a statistics reporter background task
pub(crate) struct StatsReporterParams {
    /// Counters of the running batch
    pub stats: Arc<RunStatistics>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Time between snapshots
    pub interval: Duration,
    /// Stops the reporter
    pub cancel_token: CancellationToken,
}

/// Spawn a task that periodically emits a statistics snapshot.
pub(crate) fn spawn_stats_reporter(params: StatsReporterParams) -> tokio::task::JoinHandle<()> {
    let StatsReporterParams {
        stats,
        event_tx,
        interval,
        cancel_token,
    } = params;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    event_tx
                        .send(Event::Stats {
                            stats: stats.snapshot(),
                        })
                        .ok();
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}
