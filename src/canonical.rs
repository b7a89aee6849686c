//! URL canonicalization
//!
//! Every accepted input form is reduced to one stable string before it is used
//! as a cache or duplicate key:
//!
//! - videos: `https://www.youtube.com/watch?v=<id>`
//! - playlists: `https://www.youtube.com/playlist?list=<id>`
//!
//! Anything else is rejected with [`Error::InvalidUrl`] before any network call.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::{Error, Result};

static VIDEO_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_-]{11}$").ok());

static PLAYLIST_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_-]{2,64}$").ok());

/// A recognized media locator
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MediaLocator {
    /// A single video
    Video {
        /// 11-character video id
        id: String,
    },
    /// A playlist
    Playlist {
        /// Playlist id
        id: String,
    },
}

impl MediaLocator {
    /// Parse any accepted input form
    ///
    /// # Examples
    ///
    /// ```
    /// use media_dl::canonical::MediaLocator;
    ///
    /// let locator = MediaLocator::parse("https://youtu.be/dQw4w9WgXcQ?t=42").unwrap();
    /// assert_eq!(
    ///     locator.canonical_url(),
    ///     "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
    /// );
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "empty input"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let url = Url::parse(&with_scheme).map_err(|e| invalid(raw, &e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(raw, "unsupported scheme"));
        }

        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| invalid(raw, "missing host"))?;
        let host = strip_subdomain(&host);

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|part| !part.is_empty()).collect())
            .unwrap_or_default();

        match host {
            "youtu.be" => match segments.first() {
                Some(id) => video(raw, id),
                None => Err(invalid(raw, "missing video id")),
            },
            "youtube.com" | "youtube-nocookie.com" => parse_youtube_path(raw, &url, &segments),
            _ => Err(invalid(raw, "unsupported host")),
        }
    }

    /// The canonical URL string
    pub fn canonical_url(&self) -> String {
        match self {
            MediaLocator::Video { id } => format!("https://www.youtube.com/watch?v={id}"),
            MediaLocator::Playlist { id } => format!("https://www.youtube.com/playlist?list={id}"),
        }
    }

    /// The video or playlist id
    pub fn id(&self) -> &str {
        match self {
            MediaLocator::Video { id } | MediaLocator::Playlist { id } => id,
        }
    }

    /// Whether this locator names a playlist
    pub fn is_playlist(&self) -> bool {
        matches!(self, MediaLocator::Playlist { .. })
    }
}

impl std::fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_url())
    }
}

/// Canonicalize a raw URL string
pub fn canonicalize(raw: &str) -> Result<String> {
    MediaLocator::parse(raw).map(|locator| locator.canonical_url())
}

fn parse_youtube_path(raw: &str, url: &Url, segments: &[&str]) -> Result<MediaLocator> {
    let query = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };

    match segments {
        ["watch"] => match (query("v"), query("list")) {
            (Some(id), _) => video(raw, &id),
            (None, Some(list)) => playlist(raw, &list),
            (None, None) => Err(invalid(raw, "missing video id")),
        },
        ["playlist"] => match query("list") {
            Some(list) => playlist(raw, &list),
            None => Err(invalid(raw, "missing playlist id")),
        },
        ["embed" | "shorts" | "live" | "v", id, ..] => video(raw, id),
        _ => Err(invalid(raw, "unrecognized path")),
    }
}

fn strip_subdomain(host: &str) -> &str {
    ["www.", "m.", "music."]
        .iter()
        .find_map(|prefix| host.strip_prefix(prefix))
        .unwrap_or(host)
}

fn video(raw: &str, id: &str) -> Result<MediaLocator> {
    if matches_pattern(&VIDEO_ID, id) {
        Ok(MediaLocator::Video { id: id.to_string() })
    } else {
        Err(invalid(raw, "malformed video id"))
    }
}

fn playlist(raw: &str, id: &str) -> Result<MediaLocator> {
    if matches_pattern(&PLAYLIST_ID, id) {
        Ok(MediaLocator::Playlist { id: id.to_string() })
    } else {
        Err(invalid(raw, "malformed playlist id"))
    }
}

fn matches_pattern(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    }
}
