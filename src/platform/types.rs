use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscribed channel, as much of it as the feed scan needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelRef {
    pub id: String,
    pub title: String,
}

/// One video in the aggregated feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoItem {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub published_at: DateTime<Utc>,
    pub video_url: String,
}

impl VideoItem {
    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }
}

/// One caption track attached to a video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptionTrack {
    pub id: String,
    pub language: String,
    /// "standard" or "asr" (auto-generated).
    pub track_kind: Option<String>,
}

/// Caption download formats, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFormat {
    Srt,
    Vtt,
    Sbv,
}

impl CaptionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
            Self::Sbv => "sbv",
        }
    }

    /// Preferred format first; the rest feed the fallback chain.
    pub const ALL: [CaptionFormat; 3] = [Self::Srt, Self::Vtt, Self::Sbv];
}

/// Title/description/publish metadata for one video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}
