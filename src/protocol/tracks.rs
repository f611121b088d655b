use serde::{Deserialize, Serialize};

use crate::common::types::TrackId;

/// Where a track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Youtube,
    Soundcloud,
    Spotify,
    Deezer,
    Http,
    Local,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TrackSource {
    /// Best-effort origin detection from a resource URL.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains("youtube.com") || lower.contains("youtu.be") {
            Self::Youtube
        } else if lower.contains("soundcloud.com") {
            Self::Soundcloud
        } else if lower.contains("spotify.com") || lower.starts_with("spotify:") {
            Self::Spotify
        } else if lower.contains("deezer.com") {
            Self::Deezer
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Http
        } else if lower.starts_with("file://") || lower.starts_with('/') {
            Self::Local
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Soundcloud => "soundcloud",
            Self::Spotify => "spotify",
            Self::Deezer => "deezer",
            Self::Http => "http",
            Self::Local => "local",
            Self::Unknown => "unknown",
        }
    }
}

/// A playable item in a session queue.
///
/// Descriptive fields come from the resolver or recommender. The bookkeeping
/// fields at the bottom are owned by the session and are the only ones it
/// mutates after enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Session-local id, assigned at enqueue.
    #[serde(default)]
    pub id: TrackId,
    /// Resource key understood by the source resolver.
    pub url: String,
    /// Id of the track on its upstream service.
    #[serde(default)]
    pub upstream_id: Option<String>,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub source: TrackSource,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Human readable length, `m:ss` or `h:mm:ss`.
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub last_error: Option<String>,
    /// Alternate resolution attempts tried so far.
    #[serde(default)]
    pub fallback_index: u32,
    /// Stream descriptor resolved ahead of time by the prefetcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch_resolved: Option<String>,
}

impl Track {
    pub fn new(url: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: TrackId::default(),
            source: TrackSource::from_url(&url),
            url,
            upstream_id: None,
            title: title.into(),
            author: author.into(),
            thumbnail: None,
            duration: None,
            duration_ms: None,
            last_error: None,
            fallback_index: 0,
            prefetch_resolved: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn with_upstream_id(mut self, upstream_id: impl Into<String>) -> Self {
        self.upstream_id = Some(upstream_id.into());
        self
    }

    /// Fills `duration_ms` from the human string (or the other way round).
    /// Returns false when neither form is available.
    pub fn normalize_duration(&mut self) -> bool {
        if self.duration_ms.is_none_or(|ms| ms == 0) {
            if let Some(ms) = self.duration.as_deref().and_then(parse_duration) {
                self.duration_ms = Some(ms);
            }
        }
        match self.duration_ms {
            Some(ms) if ms > 0 => {
                if self.duration.is_none() {
                    self.duration = Some(format_duration(ms));
                }
                true
            }
            _ => false,
        }
    }

    /// Known, non-zero length in milliseconds.
    pub fn length_ms(&self) -> Option<u64> {
        self.duration_ms.filter(|ms| *ms > 0)
    }

    /// Drops everything the session learned about this track while playing it.
    pub fn reset_bookkeeping(&mut self) {
        self.last_error = None;
        self.fallback_index = 0;
        self.prefetch_resolved = None;
    }
}

/// Parses `ss`, `m:ss` or `h:mm:ss` into milliseconds.
pub fn parse_duration(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total: u64 = 0;
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part.trim().parse().ok()?;
        // Every field after the leading one is a base-60 digit.
        if i > 0 && value >= 60 {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    total.checked_mul(1000)
}

/// Formats milliseconds as `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> Track {
        Track::new(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "Never Gonna Give You Up",
            "Rick Astley",
        )
        .with_upstream_id("dQw4w9WgXcQ")
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("3:00"), Some(180_000));
        assert_eq!(parse_duration("1:02:03"), Some(3_723_000));
        assert_eq!(parse_duration("45"), Some(45_000));
        assert_eq!(parse_duration(" 0:07 "), Some(7_000));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("3:75"), None);
        assert_eq!(parse_duration("a:bc"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(180_000), "3:00");
        assert_eq!(format_duration(3_723_000), "1:02:03");
        assert_eq!(format_duration(999), "0:00");
    }

    #[test]
    fn test_normalize_from_string() {
        let mut track = sample_track().with_duration("3:33");
        assert!(track.normalize_duration());
        assert_eq!(track.duration_ms, Some(213_000));
    }

    #[test]
    fn test_normalize_fills_human_string() {
        let mut track = sample_track().with_duration_ms(212_000);
        assert!(track.normalize_duration());
        assert_eq!(track.duration.as_deref(), Some("3:32"));
    }

    #[test]
    fn test_normalize_without_any_duration() {
        let mut track = sample_track();
        assert!(!track.normalize_duration());
        assert_eq!(track.length_ms(), None);
    }

    #[test]
    fn test_source_detection() {
        assert_eq!(sample_track().source, TrackSource::Youtube);
        assert_eq!(
            TrackSource::from_url("https://soundcloud.com/a/b"),
            TrackSource::Soundcloud
        );
        assert_eq!(
            TrackSource::from_url("https://cdn.example.com/a.mp3"),
            TrackSource::Http
        );
        assert_eq!(TrackSource::from_url("ytsearch:foo"), TrackSource::Unknown);
    }

    #[test]
    fn test_deserialize_minimal_json() {
        let track: Track = serde_json::from_str(
            r#"{"url":"https://x.test/a.mp3","title":"A","author":"B","source":"vimeo"}"#,
        )
        .expect("minimal track should parse");
        assert_eq!(track.source, TrackSource::Unknown);
        assert!(track.id.is_empty());
        assert_eq!(track.fallback_index, 0);
    }
}
