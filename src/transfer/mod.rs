//! Byte transfer: the transport seam and the segmented transfer engine
//!
//! [`ChunkedTransfer`] splits a direct HTTP(S) resource into byte ranges, fetches
//! them in parallel through a [`Transport`] and merges them in order. Completed
//! segments survive failures, so retrying a transfer only fetches what is missing.

mod chunked;
mod http;
mod traits;

#[cfg(test)]
pub(crate) mod test_transport;

pub use chunked::{
    ChunkSegment, ChunkedTransfer, TransferProgress, TransferReport, plan_segments, segment_dir,
    segment_path,
};
pub use http::HttpTransport;
pub use traits::{ByteStream, ProbeResult, Transport};
