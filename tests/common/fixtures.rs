//! Scripted extraction backend and an HTTP server that honors byte ranges

use async_trait::async_trait;
use media_dl::{
    BackendDownload, Error, ExtractionBackend, ExtractionFailure, FormatRecord, PlaylistInfo,
    Result, VideoRecord,
};
use media_dl::transfer::TransferProgress;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Deterministic payload of `len` bytes
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

/// Serves one body, answering `Range: bytes=a-b` with 206 partial content
pub struct RangeResponder {
    body: Vec<u8>,
    ranges: bool,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body, ranges: true }
    }

    /// Ignore range headers and always send the whole body
    pub fn without_ranges(body: Vec<u8>) -> Self {
        Self {
            body,
            ranges: false,
        }
    }

    fn requested_range(&self, request: &Request) -> Option<(usize, usize)> {
        let value = request.headers.get("range")?.to_str().ok()?;
        let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
        let start: usize = start.parse().ok()?;
        let end: usize = end.parse().ok()?;
        let last = self.body.len().checked_sub(1)?;
        (start <= end && start <= last).then_some((start, end.min(last)))
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match self.requested_range(request).filter(|_| self.ranges) {
            Some((start, end)) => ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
                )
                .set_body_bytes(self.body[start..=end].to_vec()),
            None => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        }
    }
}

/// Mount `responder` at `/media/{id}.mp4`; HEAD is rejected so probes use a ranged GET
pub async fn mount_media(server: &MockServer, id: &str, responder: RangeResponder) {
    let path = format!("/media/{id}.mp4");
    Mock::given(method("HEAD"))
        .and(wiremock::matchers::path(path.as_str()))
        .respond_with(ResponseTemplate::new(405))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path(path.as_str()))
        .respond_with(responder)
        .mount(server)
        .await;
}

/// A combined audio+video mp4 hosted on `server`
pub fn hosted_format(server: &MockServer, id: &str, size: u64) -> FormatRecord {
    FormatRecord {
        format_id: "18".into(),
        url: Some(format!("{}/media/{id}.mp4", server.uri())),
        protocol: Some("http".into()),
        height: Some(360),
        fps: Some(25.0),
        bitrate: Some(600.0),
        video_codec: Some("avc1.42001E".into()),
        audio_codec: Some("mp4a.40.2".into()),
        extension: "mp4".into(),
        file_size: Some(size),
        file_size_approx: None,
    }
}

pub fn video(id: &str, title: &str, formats: Vec<FormatRecord>) -> VideoRecord {
    VideoRecord {
        url: watch_url(id),
        id: Some(id.to_string()),
        title: title.to_string(),
        duration: Some(61.0),
        uploader: Some("Integration".into()),
        view_count: None,
        upload_date: None,
        description: None,
        tags: vec![],
        formats,
    }
}

/// Extraction backend answering from a fixed table
#[derive(Default)]
pub struct ScriptedBackend {
    videos: HashMap<String, VideoRecord>,
    playlists: HashMap<String, PlaylistInfo>,
    extract_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(videos: impl IntoIterator<Item = VideoRecord>) -> Self {
        Self {
            videos: videos.into_iter().map(|v| (v.url.clone(), v)).collect(),
            ..Self::default()
        }
    }

    pub fn with_playlist(mut self, url: &str, playlist: PlaylistInfo) -> Self {
        self.playlists.insert(url.to_string(), playlist);
        self
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    async fn extract_info(&self, url: &str) -> Result<VideoRecord> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.videos.get(url).cloned().ok_or_else(|| Error::Extraction {
            url: url.to_string(),
            kind: ExtractionFailure::NotFound,
            message: "ERROR: Video unavailable".into(),
        })
    }

    async fn expand_playlist(&self, url: &str) -> Result<PlaylistInfo> {
        self.playlists.get(url).cloned().ok_or_else(|| Error::Extraction {
            url: url.to_string(),
            kind: ExtractionFailure::NotFound,
            message: "ERROR: playlist does not exist".into(),
        })
    }

    async fn download(
        &self,
        request: &BackendDownload,
        _progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<PathBuf> {
        Err(Error::NotSupported(format!(
            "scripted backend cannot download {}",
            request.url
        )))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
