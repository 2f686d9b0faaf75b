use serde::Deserialize;

// 可调上限：缓存最大保留 30 天
const MAX_AGE_HOURS_CEILING: u64 = 720;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub captions: CaptionConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// User-adjustable cache behavior, mirrored one-to-one in the persisted
/// settings object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum feed age in hours before a cached feed is considered stale.
    pub max_feed_age_hours: u64,
    /// Maximum summary/caption age in hours.
    pub max_summary_age_hours: u64,
    /// Prefer any cached value (even expired) over a live call when the
    /// daily quota is close to its ceiling.
    pub prefer_cache: bool,
    /// Drop expired and oversized entries in the background.
    pub auto_cleanup_enabled: bool,
    /// Approximate ceiling for the aggregate cache size, in megabytes.
    pub max_cache_size_mb: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_feed_age_hours: 24,
            max_summary_age_hours: 168, // 7 days
            prefer_cache: true,
            auto_cleanup_enabled: false,
            max_cache_size_mb: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Platform-defined daily unit ceiling.
    pub daily_limit: u64,
    /// Fraction of the ceiling past which callers are warned.
    pub warn_fraction: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 10_000,
            warn_fraction: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub max_requests_per_minute: usize,
    pub min_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            min_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Subscription channels scanned per feed refresh.
    pub max_channels: usize,
    /// Videos fetched per scanned channel.
    pub max_videos_per_channel: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_channels: 3,
            max_videos_per_channel: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub preferred_language: String,
    /// Substitute the video description when a transcript cannot be had.
    pub description_fallback: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            preferred_language: "en".to_string(),
            description_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub model: String,
    pub max_tokens_per_summarization: usize,
    /// Conservative character-per-token multiplier for chunk sizing.
    pub chars_per_token: usize,
    /// Partial summaries combined per reduction batch.
    pub reduce_batch_size: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_tokens_per_summarization: 2000,
            chars_per_token: 4,
            reduce_batch_size: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-call budget for every live network request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // 首先尝试从环境变量加载
        if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            return Self::from_file(&config_path);
        }

        // 否则使用默认配置
        Ok(Self::default())
    }

    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config.clamped())
    }

    /// Clamp user-adjustable values to sane bounds. Ages must be positive
    /// and never exceed 30 days.
    pub fn clamped(mut self) -> Self {
        self.cache.max_feed_age_hours = self.cache.max_feed_age_hours.clamp(1, MAX_AGE_HOURS_CEILING);
        self.cache.max_summary_age_hours =
            self.cache.max_summary_age_hours.clamp(1, MAX_AGE_HOURS_CEILING);
        self.quota.warn_fraction = self.quota.warn_fraction.clamp(0.0, 1.0);
        if self.throttle.max_requests_per_minute == 0 {
            self.throttle.max_requests_per_minute = 1;
        }
        if self.summarizer.chars_per_token == 0 {
            self.summarizer.chars_per_token = 4;
        }
        if self.summarizer.reduce_batch_size == 0 {
            self.summarizer.reduce_batch_size = 3;
        }
        self
    }
}
