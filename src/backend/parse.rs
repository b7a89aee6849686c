//! Parsers for yt-dlp output
//!
//! Converts the tool's JSON into [`VideoRecord`]/[`PlaylistInfo`], classifies
//! stderr into [`ExtractionFailure`] causes, and reads the progress lines
//! produced by our `--progress-template`.

use serde::Deserialize;

use crate::error::{Error, ExtractionFailure, Result};
use crate::transfer::TransferProgress;
use crate::types::{FormatRecord, PlaylistInfo, VideoRecord};

/// Prefix of progress lines on stdout
pub(crate) const PROGRESS_PREFIX: &str = "media-dl-progress:";

/// Value passed to `--progress-template`
pub(crate) fn progress_template() -> String {
    format!(
        "download:{PROGRESS_PREFIX}%(progress.downloaded_bytes)s/%(progress.total_bytes)s/%(progress.total_bytes_estimate)s"
    )
}

#[derive(Debug, Deserialize)]
struct RawVideo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    formats: Option<Vec<RawFormat>>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    vbr: Option<f64>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    entries: Option<Vec<RawEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
}

impl From<RawFormat> for FormatRecord {
    fn from(raw: RawFormat) -> Self {
        FormatRecord {
            format_id: raw.format_id.unwrap_or_default(),
            url: raw.url,
            protocol: raw.protocol,
            height: raw.height,
            fps: raw.fps,
            bitrate: raw.tbr.or(raw.vbr),
            video_codec: raw.vcodec,
            audio_codec: raw.acodec,
            extension: raw.ext.unwrap_or_default(),
            file_size: raw.filesize,
            file_size_approx: raw.filesize_approx.map(|size| size.max(0.0) as u64),
        }
    }
}

/// Parse `--dump-json` output for `url`
pub fn parse_video_json(url: &str, json: &[u8]) -> Result<VideoRecord> {
    let raw: RawVideo = serde_json::from_slice(json)?;
    Ok(VideoRecord {
        url: raw.webpage_url.unwrap_or_else(|| url.to_string()),
        title: raw
            .title
            .or_else(|| raw.id.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        id: raw.id,
        duration: raw.duration,
        uploader: raw.uploader,
        view_count: raw.view_count,
        upload_date: raw.upload_date,
        description: raw.description,
        tags: raw.tags.unwrap_or_default(),
        formats: raw
            .formats
            .unwrap_or_default()
            .into_iter()
            .map(FormatRecord::from)
            .filter(|f| !f.format_id.is_empty())
            .collect(),
    })
}

/// Parse `--flat-playlist --dump-single-json` output
pub fn parse_playlist_json(json: &[u8]) -> Result<PlaylistInfo> {
    let raw: RawPlaylist = serde_json::from_slice(json)?;
    let entries = raw
        .entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            entry
                .url
                .filter(|u| u.starts_with("http"))
                .or(entry.webpage_url)
                .or_else(|| {
                    entry
                        .id
                        .map(|id| format!("https://www.youtube.com/watch?v={id}"))
                })
        })
        .collect();

    Ok(PlaylistInfo {
        id: raw.id,
        title: raw.title,
        entries,
    })
}

/// Classify yt-dlp stderr into a failure cause
pub fn classify_failure(stderr: &str) -> ExtractionFailure {
    let lower = stderr.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("http error 429") || has("too many requests") {
        ExtractionFailure::RateLimited
    } else if has("http error 403") || has("sign in to confirm") {
        ExtractionFailure::AccessDenied
    } else if has("http error 404") || has("video unavailable") || has("private video") {
        ExtractionFailure::NotFound
    } else if has("getaddrinfo")
        || has("name or service not known")
        || has("name resolution")
        || has("timed out")
        || has("connection reset")
        || has("network is unreachable")
    {
        ExtractionFailure::Network
    } else if has("unable to extract") || has("failed to extract") || has("unsupported url") {
        ExtractionFailure::Unsupported
    } else {
        ExtractionFailure::Tool
    }
}

/// Build an extraction error from a failed tool run
pub fn extraction_error(url: &str, stderr: &str) -> Error {
    let message = last_error_line(stderr);
    Error::Extraction {
        url: url.to_string(),
        kind: classify_failure(stderr),
        message,
    }
}

/// The most relevant line of tool stderr (the last `ERROR:` line, else the last line)
pub fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "no output from extractor".to_string())
}

/// Whether a failed download stderr points at the merge/post-processing step
pub fn is_merge_failure(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("ffmpeg") || lower.contains("merging") || lower.contains("postprocessing")
}

/// Parse one of our progress lines
///
/// yt-dlp prints `NA` for unknown values; the estimate stands in for a missing total.
pub fn parse_progress_line(line: &str) -> Option<TransferProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split('/').map(parse_number);

    let downloaded = fields.next()??;
    let total = fields.next().flatten();
    let estimate = fields.next().flatten();

    Some(TransferProgress {
        downloaded_bytes: downloaded,
        total_bytes: total.or(estimate).unwrap_or(0),
    })
}

fn parse_number(field: &str) -> Option<u64> {
    let field = field.trim();
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().map(|v| v.max(0.0) as u64))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "duration": 212.0,
        "uploader": "Rick Astley",
        "view_count": 1500000000,
        "upload_date": "20091025",
        "description": "The official video",
        "tags": ["rick", "astley"],
        "formats": [
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2",
             "tbr": 129.5, "filesize": 3432000, "protocol": "https",
             "url": "https://rr1.example/140"},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none",
             "height": 1080, "fps": 25, "vbr": 2000.0, "filesize_approx": 52000000.7,
             "protocol": "https", "url": "https://rr1.example/137"},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2",
             "height": 360, "fps": 25, "tbr": 500.0, "protocol": "https",
             "url": "https://rr1.example/18"},
            {"ext": "mhtml", "vcodec": "none", "acodec": "none"}
        ]
    }"#;

    #[test]
    fn video_json_maps_to_record() {
        let record = parse_video_json("https://youtu.be/dQw4w9WgXcQ", VIDEO_JSON.as_bytes()).unwrap();

        assert_eq!(record.id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(record.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(record.title, "Never Gonna Give You Up");
        assert_eq!(record.tags, vec!["rick", "astley"]);
        assert_eq!(record.formats.len(), 3);

        let video_only = &record.formats[1];
        assert_eq!(video_only.height, Some(1080));
        assert_eq!(video_only.bitrate, Some(2000.0));
        assert_eq!(video_only.file_size_approx, Some(52_000_000));
        assert!(!video_only.has_audio());
        assert!(record.formats[2].is_direct_http());
    }

    #[test]
    fn sparse_video_json_uses_fallbacks() {
        let record = parse_video_json("https://www.youtube.com/watch?v=abcdefghijk", br#"{"id": "abcdefghijk"}"#)
            .unwrap();
        assert_eq!(record.title, "abcdefghijk");
        assert_eq!(record.url, "https://www.youtube.com/watch?v=abcdefghijk");
        assert!(record.formats.is_empty());
        assert!(!record.has_video_format());
    }

    #[test]
    fn playlist_entries_resolve_to_urls() {
        let json = br#"{
            "id": "PL123",
            "title": "Mix",
            "entries": [
                {"id": "aaaaaaaaaaa", "url": "https://www.youtube.com/watch?v=aaaaaaaaaaa"},
                {"id": "bbbbbbbbbbb", "url": "bbbbbbbbbbb"},
                {"id": "ccccccccccc", "webpage_url": "https://www.youtube.com/watch?v=ccccccccccc"},
                {}
            ]
        }"#;
        let playlist = parse_playlist_json(json).unwrap();
        assert_eq!(playlist.title.as_deref(), Some("Mix"));
        assert_eq!(
            playlist.entries,
            vec![
                "https://www.youtube.com/watch?v=aaaaaaaaaaa",
                "https://www.youtube.com/watch?v=bbbbbbbbbbb",
                "https://www.youtube.com/watch?v=ccccccccccc",
            ]
        );
    }

    #[test]
    fn stderr_is_classified() {
        let cases = [
            ("ERROR: [Errno -2] getaddrinfo failed", ExtractionFailure::Network),
            ("ERROR: Read timed out.", ExtractionFailure::Network),
            ("ERROR: Connection reset by peer", ExtractionFailure::Network),
            ("ERROR: unable to download: HTTP Error 403: Forbidden", ExtractionFailure::AccessDenied),
            ("ERROR: HTTP Error 404: Not Found", ExtractionFailure::NotFound),
            ("ERROR: [youtube] x: Video unavailable", ExtractionFailure::NotFound),
            ("ERROR: [youtube] x: Private video", ExtractionFailure::NotFound),
            ("ERROR: HTTP Error 429: Too Many Requests", ExtractionFailure::RateLimited),
            ("ERROR: Unable to extract uploader id", ExtractionFailure::Unsupported),
            ("ERROR: something odd", ExtractionFailure::Tool),
        ];
        for (stderr, expected) in cases {
            assert_eq!(classify_failure(stderr), expected, "stderr: {stderr}");
        }
    }

    #[test]
    fn extraction_error_carries_last_error_line() {
        let stderr = "WARNING: slow\nERROR: Private video\n\n";
        match extraction_error("https://x", stderr) {
            Error::Extraction { kind, message, .. } => {
                assert_eq!(kind, ExtractionFailure::NotFound);
                assert_eq!(message, "ERROR: Private video");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(last_error_line(""), "no output from extractor");
    }

    #[test]
    fn progress_lines_are_parsed() {
        assert_eq!(
            parse_progress_line("media-dl-progress:1024/4096/NA"),
            Some(TransferProgress { downloaded_bytes: 1024, total_bytes: 4096 })
        );
        assert_eq!(
            parse_progress_line("media-dl-progress:10/NA/2000.5"),
            Some(TransferProgress { downloaded_bytes: 10, total_bytes: 2000 })
        );
        assert_eq!(
            parse_progress_line("media-dl-progress:10/NA/NA"),
            Some(TransferProgress { downloaded_bytes: 10, total_bytes: 0 })
        );
        assert_eq!(parse_progress_line("media-dl-progress:NA/NA/NA"), None);
        assert_eq!(parse_progress_line("[download] 50.0% of 10MiB"), None);
    }

    #[test]
    fn merge_failures_are_recognized() {
        assert!(is_merge_failure("ERROR: Postprocessing: ffmpeg not found"));
        assert!(is_merge_failure("ERROR: Merging formats failed"));
        assert!(!is_merge_failure("ERROR: HTTP Error 403"));
    }
}
