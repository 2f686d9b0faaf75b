pub mod auth;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod fallback;
pub mod fetcher;
pub mod platform;
pub mod quota;
pub mod summarize;
pub mod throttle;

pub mod prelude {
    pub use crate::auth::{AuthProvider, Credential, Principal};
    pub use crate::cache::{CacheCleaner, CachePolicy, CacheStore, PersistentStore, ResourceKind};
    pub use crate::config::Config;
    pub use crate::error::{ApiError, ErrorKind, FetchError};
    pub use crate::fallback::Fetched;
    pub use crate::fetcher::{CaptionFetcher, DescriptionFetcher, FeedFetcher};
    pub use crate::platform::{VideoPlatform, YouTubeClient};
    pub use crate::quota::QuotaTracker;
    pub use crate::summarize::{OpenAiSummarizer, Summarizer, SummaryOrchestrator};
    pub use crate::throttle::RequestThrottler;
}
