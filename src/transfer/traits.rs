//! Transport seam for the chunked transfer engine

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// What a probe learned about a remote resource
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes, 0 when the server does not say
    pub total_size: u64,
    /// Whether the server honors `Range: bytes=` requests
    pub supports_ranges: bool,
}

/// Body of a response, delivered as it arrives
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Byte transport used by the chunked transfer engine
///
/// The production implementation is [`HttpTransport`](super::HttpTransport);
/// tests substitute in-memory transports that count requests.
///
/// # Examples
///
/// ```no_run
/// use media_dl::transfer::{HttpTransport, Transport};
/// use media_dl::config::TransferConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new(&TransferConfig::default())?;
/// let probe = transport.probe("https://example.com/video.mp4").await?;
/// println!("{} bytes, ranges: {}", probe.total_size, probe.supports_ranges);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Learn the total size and range support of `url`
    async fn probe(&self, url: &str) -> Result<ProbeResult>;

    /// Fetch bytes `start..=end` of `url`
    ///
    /// Fails unless the server answers 200 or 206.
    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<ByteStream>;

    /// Fetch the whole body of `url`
    async fn fetch(&self, url: &str) -> Result<ByteStream>;

    /// Get the name of this transport implementation
    fn name(&self) -> &'static str;
}
