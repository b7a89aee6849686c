//! Format selection
//!
//! Picks the best encoding for a video under a height cap. Combined audio+video
//! streams in browser containers are preferred; otherwise the best video-only
//! stream is chosen and audio is merged in by the backend.

use crate::types::FormatRecord;

const AUDIO_BONUS: f64 = 1000.0;
const MP4_BONUS: f64 = 500.0;

/// The chosen encoding
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// Winning format
    pub format: FormatRecord,
    /// The format has no audio track and needs `bestaudio` merged in
    pub needs_audio_merge: bool,
}

impl Selection {
    /// Selector string handed to the extraction backend
    pub fn format_selector(&self) -> String {
        if self.needs_audio_merge {
            format!("{}+bestaudio/best", self.format.format_id)
        } else {
            self.format.format_id.clone()
        }
    }
}

/// Score a format under a height cap
///
/// `min(height, max_height) * fps + bitrate`, plus a bonus for an audio track
/// and another for the mp4 container. Missing numbers count as zero.
pub fn score(format: &FormatRecord, max_height: u32) -> f64 {
    let height = format.height.unwrap_or(0).min(max_height) as f64;
    let fps = format.fps.unwrap_or(0.0);
    let bitrate = format.bitrate.unwrap_or(0.0);

    let mut score = height * fps + bitrate;
    if format.has_audio() {
        score += AUDIO_BONUS;
    }
    if format.extension == "mp4" {
        score += MP4_BONUS;
    }
    score
}

/// Choose the best format, or `None` if no format carries video
///
/// Ties keep the earlier format, so equal inputs always give equal output.
pub fn select(formats: &[FormatRecord], max_height: u32) -> Option<Selection> {
    let video: Vec<&FormatRecord> = formats.iter().filter(|f| f.has_video()).collect();

    let combined: Vec<&FormatRecord> = video
        .iter()
        .copied()
        .filter(|f| f.has_audio() && matches!(f.extension.as_str(), "mp4" | "webm"))
        .collect();

    let candidates = if combined.is_empty() { video } else { combined };

    let mut best: Option<(&FormatRecord, f64)> = None;
    for format in candidates {
        let candidate_score = score(format, max_height);
        match best {
            Some((_, best_score)) if candidate_score <= best_score => {}
            _ => best = Some((format, candidate_score)),
        }
    }

    best.map(|(format, _)| Selection {
        needs_audio_merge: !format.has_audio(),
        format: format.clone(),
    })
}
