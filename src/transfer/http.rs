//! reqwest-backed transport

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use super::traits::{ByteStream, ProbeResult, Transport};
use crate::config::TransferConfig;
use crate::error::{Error, Result, TransferError};

/// HTTP(S) transport over a shared connection pool
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport with the configured user agent and timeouts
    pub fn new(config: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.request_timeout))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Fallback probe for servers that reject HEAD: ask for the first byte only
    async fn probe_with_get(&self, url: &str) -> Result<ProbeResult> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .timeout(self.request_timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => Ok(ProbeResult {
                total_size: response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range_total)
                    .unwrap_or(0),
                supports_ranges: true,
            }),
            status if status.is_success() => Ok(ProbeResult {
                total_size: header_content_length(&response),
                supports_ranges: false,
            }),
            status => Err(bad_status(url, status)),
        }
    }

    fn stream_body(response: Response) -> ByteStream {
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str) -> Result<ProbeResult> {
        let response = self
            .client
            .head(url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(
                url = %url,
                status = response.status().as_u16(),
                "HEAD rejected, probing with ranged GET"
            );
            return self.probe_with_get(url).await;
        }

        let supports_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"));

        Ok(ProbeResult {
            total_size: header_content_length(&response),
            supports_ranges,
        })
    }

    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<ByteStream> {
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(Self::stream_body(response)),
            status => Err(bad_status(url, status)),
        }
    }

    async fn fetch(&self, url: &str) -> Result<ByteStream> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(bad_status(url, response.status()));
        }
        Ok(Self::stream_body(response))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// `Content-Length` read from the header itself
///
/// `Response::content_length` reports the (empty) body size for HEAD responses.
fn header_content_length(response: &Response) -> u64 {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Total from `Content-Range: bytes 0-0/12345`
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

fn bad_status(url: &str, status: StatusCode) -> Error {
    TransferError::BadStatus {
        url: url.to_string(),
        status: status.as_u16(),
    }
    .into()
}
