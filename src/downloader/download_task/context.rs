//! Download task context: shared state, state-change events and outcome bookkeeping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::RunStatistics;
use crate::types::{Event, FailureInfo, TaskId, TaskOutcome, TaskState, VideoIdentity};

use super::super::Services;

/// Shared context for a single download task, reducing parameter passing between helpers.
pub(crate) struct TaskContext {
    pub(crate) id: TaskId,
    /// URL as supplied by the caller
    pub(crate) url: String,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) config: Arc<Config>,
    pub(crate) services: Services,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) stats: Arc<RunStatistics>,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) active_tasks: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
}

impl TaskContext {
    /// Identity before anything about the video is known
    pub(super) fn initial_identity(&self) -> VideoIdentity {
        VideoIdentity {
            task: self.id,
            url: self.url.clone(),
            video_id: None,
            title: None,
        }
    }

    /// Wait for a slot in the shared permit pool
    ///
    /// The permit is released when dropped, on every exit path of the task.
    pub(super) async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(Error::Cancelled),
            permit = self.permits.clone().acquire_owned() => permit.map_err(|_| Error::ShuttingDown),
        }
    }

    pub(super) fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(super) fn emit_state(
        &self,
        video: &VideoIdentity,
        state: TaskState,
        failure: Option<FailureInfo>,
    ) {
        self.event_tx
            .send(Event::StateChanged {
                video: video.clone(),
                state,
                failure,
            })
            .ok();
    }

    /// Remove this task from the active tasks map.
    pub(super) async fn remove_from_active(&self) {
        let mut active = self.active_tasks.lock().await;
        active.remove(&self.id);
    }

    pub(super) fn skipped(&self, video: VideoIdentity) -> TaskOutcome {
        tracing::info!(task_id = self.id.0, url = %self.url, "Already downloaded, skipping");
        self.stats.record_skipped();
        self.emit_state(&video, TaskState::Skipped, None);
        TaskOutcome {
            video,
            state: TaskState::Skipped,
            path: None,
            bytes: 0,
            failure: None,
        }
    }

    pub(super) fn completed(&self, video: VideoIdentity, path: PathBuf, bytes: u64) -> TaskOutcome {
        self.stats.record_completed(bytes);
        self.event_tx
            .send(Event::Completed {
                video: video.clone(),
                path: path.clone(),
                bytes,
            })
            .ok();
        self.emit_state(&video, TaskState::Completed, None);
        TaskOutcome {
            video,
            state: TaskState::Completed,
            path: Some(path),
            bytes,
            failure: None,
        }
    }

    /// Mark the task as failed and emit the failure event.
    pub(super) fn failed(&self, video: VideoIdentity, error: &Error) -> TaskOutcome {
        let failure = FailureInfo::from(error);
        tracing::error!(
            task_id = self.id.0,
            url = %self.url,
            kind = %failure.kind,
            error = %error,
            "Download failed"
        );
        self.stats.record_failed();
        self.emit_state(&video, TaskState::Failed, Some(failure.clone()));
        TaskOutcome {
            video,
            state: TaskState::Failed,
            path: None,
            bytes: 0,
            failure: Some(failure),
        }
    }
}
