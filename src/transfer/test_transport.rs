//! In-memory transport for engine and orchestrator tests

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{ByteStream, ProbeResult, Transport};
use crate::error::{Error, Result, TransferError};

/// Body chunk size used when streaming responses
const STREAM_CHUNK: usize = 1024;

const NO_FAILURE: u64 = u64::MAX;

/// Serves registered bodies from memory and counts every request
pub struct MemoryTransport {
    bodies: HashMap<String, Bytes>,
    ranges: bool,
    truncate_ranges: bool,
    truncate_full: bool,
    latency: Option<Duration>,
    fail_start: AtomicU64,
    probes: AtomicUsize,
    range_requests: AtomicUsize,
    full_requests: AtomicUsize,
    in_flight: AtomicUsize,
    /// Highest number of concurrent range requests observed
    pub peak_in_flight: AtomicUsize,
    /// Set once any request has been made
    pub touched: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            ranges: true,
            truncate_ranges: false,
            truncate_full: false,
            latency: None,
            fail_start: AtomicU64::new(NO_FAILURE),
            probes: AtomicUsize::new(0),
            range_requests: AtomicUsize::new(0),
            full_requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            touched: AtomicBool::new(false),
        }
    }

    pub fn with_body(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Ranged responses come back one byte short
    pub fn with_truncated_ranges(mut self) -> Self {
        self.truncate_ranges = true;
        self
    }

    /// Full-body responses come back one byte short
    pub fn with_truncated_bodies(mut self) -> Self {
        self.truncate_full = true;
        self
    }

    /// Fail any range request starting at `start` with a 503
    pub fn fail_range_at(&self, start: u64) {
        self.fail_start.store(start, Ordering::SeqCst);
    }

    pub fn clear_failure(&self) {
        self.fail_start.store(NO_FAILURE, Ordering::SeqCst);
    }

    pub fn reset_counters(&self) {
        self.probes.store(0, Ordering::SeqCst);
        self.range_requests.store(0, Ordering::SeqCst);
        self.full_requests.store(0, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn range_requests(&self) -> usize {
        self.range_requests.load(Ordering::SeqCst)
    }

    pub fn full_requests(&self) -> usize {
        self.full_requests.load(Ordering::SeqCst)
    }

    fn body(&self, url: &str) -> Result<Bytes> {
        self.bodies.get(url).cloned().ok_or_else(|| {
            TransferError::BadStatus {
                url: url.to_string(),
                status: 404,
            }
            .into()
        })
    }

    fn stream(data: Bytes) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = data
            .chunks(STREAM_CHUNK)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        futures::stream::iter(chunks).boxed()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn probe(&self, url: &str) -> Result<ProbeResult> {
        self.touched.store(true, Ordering::SeqCst);
        self.probes.fetch_add(1, Ordering::SeqCst);
        let body = self.body(url)?;
        Ok(ProbeResult {
            total_size: body.len() as u64,
            supports_ranges: self.ranges,
        })
    }

    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<ByteStream> {
        self.touched.store(true, Ordering::SeqCst);
        self.range_requests.fetch_add(1, Ordering::SeqCst);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_start.load(Ordering::SeqCst) == start {
            return Err(Error::Transfer(TransferError::BadStatus {
                url: url.to_string(),
                status: 503,
            }));
        }

        let body = self.body(url)?;
        let last = (end as usize).min(body.len().saturating_sub(1));
        let mut slice = body.slice(start as usize..=last);
        if self.truncate_ranges && !slice.is_empty() {
            slice.truncate(slice.len() - 1);
        }
        Ok(Self::stream(slice))
    }

    async fn fetch(&self, url: &str) -> Result<ByteStream> {
        self.touched.store(true, Ordering::SeqCst);
        self.full_requests.fetch_add(1, Ordering::SeqCst);
        let mut body = self.body(url)?;
        if self.truncate_full && !body.is_empty() {
            body.truncate(body.len() - 1);
        }
        Ok(Self::stream(body))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
