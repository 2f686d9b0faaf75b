use async_trait::async_trait;

use crate::error::ApiError;

mod client;
pub mod types;

pub use client::YouTubeClient;
pub use types::{CaptionFormat, CaptionTrack, ChannelRef, VideoDetails, VideoItem};

// Platform-defined unit costs per call, charged against the daily quota.
pub const COST_SUBSCRIPTIONS_LIST: u64 = 1;
pub const COST_SEARCH_LIST: u64 = 100;
pub const COST_CAPTIONS_LIST: u64 = 50;
pub const COST_CAPTIONS_DOWNLOAD: u64 = 200;
pub const COST_VIDEOS_LIST: u64 = 1;

/// The video platform API, consumed as a black box. Every call may fail
/// with a rate-limit, permission, or not-found condition; implementations
/// must surface the raw status and structured reason code through
/// [`ApiError`] so the classifier can distinguish them.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// The authenticated user's subscriptions, newest first as the platform
    /// returns them.
    async fn list_subscriptions(
        &self,
        token: &str,
        max_results: usize,
    ) -> Result<Vec<ChannelRef>, ApiError>;

    /// A channel's most recent uploads, newest first.
    async fn list_recent_videos(
        &self,
        token: &str,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<VideoItem>, ApiError>;

    /// Caption tracks attached to a video. An empty list means the video
    /// has no captions at all.
    async fn list_caption_tracks(
        &self,
        token: &str,
        video_id: &str,
    ) -> Result<Vec<CaptionTrack>, ApiError>;

    /// Download one caption track in the given format.
    async fn download_caption(
        &self,
        token: &str,
        track_id: &str,
        format: CaptionFormat,
    ) -> Result<String, ApiError>;

    /// Title/description/publish metadata for one video.
    async fn video_details(&self, token: &str, video_id: &str) -> Result<VideoDetails, ApiError>;
}
