//! Downloader integration tests over a scripted backend and an in-memory transport.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast;

use super::test_helpers::{
    FakeBackend, IDS, audio_only_format, create_test_downloader, direct_format,
    downloader_with_config, media_url, record, test_config, video_only_format, watch_url,
};
use super::*;
use crate::error::ExtractionFailure;
use crate::transfer::test_transport::MemoryTransport;
use crate::types::{FailureKind, PlaylistInfo, TaskState};

mod disk_space;

/// Transport serving `size`-byte bodies for every id
fn transport_for(ids: &[&str], size: usize) -> MemoryTransport {
    ids.iter().fold(MemoryTransport::new(), |transport, id| {
        transport.with_body(&media_url(id), vec![7u8; size])
    })
}

/// Backend with one directly downloadable video per id, titled "Video <n>"
fn backend_for(ids: &[&str], size: u64) -> FakeBackend {
    ids.iter().enumerate().fold(FakeBackend::new(), |backend, (n, id)| {
        backend.with_record(record(id, &format!("Video {n}"), vec![direct_format(id, size)]))
    })
}

/// Drain every event already buffered on `rx`
fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// States reported for the task working on `url`, in emission order
fn states_for(events: &[Event], url: &str) -> Vec<TaskState> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StateChanged { video, state, .. } if video.url == url => Some(*state),
            _ => None,
        })
        .collect()
}
