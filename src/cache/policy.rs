use chrono::Duration;

use crate::config::CacheSettings;

use super::entry::CacheEntry;

/// The resource kinds the cache distinguishes. Each maps to a namespace in
/// the persistent mirror and a validity window in the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Feed,
    Caption,
    Summary,
    Description,
}

impl ResourceKind {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Feed => "cached_feed",
            Self::Caption => "cached_captions",
            Self::Summary => "cached_summaries",
            Self::Description => "cached_descriptions",
        }
    }
}

/// Validity windows and size ceiling derived from the user settings.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    max_feed_age: Duration,
    max_summary_age: Duration,
    pub max_size_bytes: u64,
    pub auto_cleanup: bool,
}

impl CachePolicy {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            max_feed_age: Duration::hours(settings.max_feed_age_hours as i64),
            max_summary_age: Duration::hours(settings.max_summary_age_hours as i64),
            max_size_bytes: settings.max_cache_size_mb * 1024 * 1024,
            auto_cleanup: settings.auto_cleanup_enabled,
        }
    }

    /// Captions and summaries share the longer window; feed-shaped data
    /// (including descriptions) uses the shorter one.
    pub fn max_age(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Feed | ResourceKind::Description => self.max_feed_age,
            ResourceKind::Caption | ResourceKind::Summary => self.max_summary_age,
        }
    }

    pub fn is_valid<T>(&self, entry: &CacheEntry<T>, kind: ResourceKind) -> bool {
        entry.is_valid(self.max_age(kind))
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}
