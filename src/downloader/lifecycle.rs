//! Shutdown and cancellation.

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::Event;

use super::MediaDownloader;

/// How long `shutdown` waits for cancelled tasks to unwind
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new work
    /// 2. Cancels the run token, which reaches every batch and task
    /// 3. Waits for active tasks to unwind with a timeout (30 seconds)
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Completed segment files are left on disk, so a later run resumes them.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.run_state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        self.run_token().await.cancel();
        self.cancel_active().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_tasks()).await {
            Ok(()) => tracing::info!("All active tasks stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for tasks to stop, proceeding with shutdown")
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Cancel all running work but keep the downloader usable
    ///
    /// Running tasks finish as `Failed` with reason "cancelled". Calls made
    /// afterwards run under a fresh token.
    pub async fn cancel_all(&self) {
        let mut token = self.run_state.run_token.write().await;
        token.cancel();
        *token = CancellationToken::new();
        drop(token);

        let cancelled = self.cancel_active().await;
        tracing::info!(cancelled, "Cancelled all running tasks");
    }

    /// Number of tasks currently registered as running
    pub async fn active_task_count(&self) -> usize {
        self.run_state.active_tasks.lock().await.len()
    }

    async fn cancel_active(&self) -> usize {
        let active = self.run_state.active_tasks.lock().await;
        for (id, token) in active.iter() {
            tracing::debug!(task_id = id.0, "Signaling cancellation");
            token.cancel();
        }
        active.len()
    }

    async fn wait_for_active_tasks(&self) {
        loop {
            let active_count = self.active_task_count().await;
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active tasks to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
