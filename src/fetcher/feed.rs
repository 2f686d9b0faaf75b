use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::{AuthProvider, Credential};
use crate::cache::{key, CacheStore};
use crate::classify;
use crate::config::Config;
use crate::error::FetchError;
use crate::fallback::{self, Fetched, Strategy};
use crate::platform::{VideoItem, VideoPlatform, COST_SEARCH_LIST, COST_SUBSCRIPTIONS_LIST};
use crate::quota::QuotaTracker;
use crate::throttle::RequestThrottler;

use super::{emergency_lookup, PRIORITY_FEED};

const SUBSCRIPTION_PAGE_SIZE: usize = 50;

/// Aggregates a user's subscription feed with minimum live-API cost: cache
/// first, any-age cache when quota is tight, then a bounded throttled scan.
pub struct FeedFetcher {
    platform: Arc<dyn VideoPlatform>,
    auth: Arc<dyn AuthProvider>,
    cache: CacheStore<Vec<VideoItem>>,
    quota: QuotaTracker,
    throttler: RequestThrottler,
    prefer_cache: bool,
    max_channels: usize,
    max_videos_per_channel: usize,
}

impl FeedFetcher {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        auth: Arc<dyn AuthProvider>,
        cache: CacheStore<Vec<VideoItem>>,
        quota: QuotaTracker,
        throttler: RequestThrottler,
        config: &Config,
    ) -> Self {
        Self {
            platform,
            auth,
            cache,
            quota,
            throttler,
            prefer_cache: config.cache.prefer_cache,
            max_channels: config.feed.max_channels,
            max_videos_per_channel: config.feed.max_videos_per_channel,
        }
    }

    pub async fn fetch(&self, credential: &Credential) -> Result<Fetched<Vec<VideoItem>>, FetchError> {
        let cache_key = key::feed_key(&credential.token);

        if let Some(items) = self.cache.get(&cache_key, false).await {
            debug!("serving feed from cache");
            return Ok(Fetched::fresh(items));
        }

        // 配额吃紧时宁可用过期缓存也不发请求
        if self.prefer_cache && self.quota.is_approaching_limit().await {
            if let Some(items) = self.cache.get(&cache_key, true).await {
                warn!("approaching quota limit, serving cached feed");
                return Ok(Fetched::degraded(items));
            }
        }

        let outcome = fallback::execute(
            self.live_feed(credential.token.clone()),
            Vec::new(),
            classify::classify,
            emergency_lookup(&self.cache, &cache_key),
        )
        .await;

        match outcome {
            Ok(fetched) => {
                if !fetched.degraded {
                    info!("feed refreshed: {} videos", fetched.value.len());
                    self.cache.set(&cache_key, fetched.value.clone()).await;
                }
                Ok(fetched)
            }
            Err(err) => {
                if matches!(err, FetchError::AuthInvalid(_)) {
                    self.auth.invalidate(&credential.token).await;
                }
                Err(err)
            }
        }
    }

    // 限定扫描范围以压住最坏情况的配额开销
    fn live_feed(&self, token: String) -> Strategy<Vec<VideoItem>> {
        let platform = self.platform.clone();
        let throttler = self.throttler.clone();
        let quota = self.quota.clone();
        let max_channels = self.max_channels;
        let per_channel = self.max_videos_per_channel;
        let fingerprint = key::principal_fingerprint(&token);

        Box::pin(async move {
            let channels = {
                let platform = platform.clone();
                let token = token.clone();
                throttler
                    .enqueue(
                        format!("subscriptions:{}", fingerprint),
                        move || async move {
                            platform
                                .list_subscriptions(&token, SUBSCRIPTION_PAGE_SIZE)
                                .await
                        },
                        PRIORITY_FEED,
                    )
                    .await?
            };
            quota.increment(COST_SUBSCRIPTIONS_LIST).await;

            let mut items = Vec::new();
            for channel in channels.into_iter().take(max_channels) {
                let batch = {
                    let platform = platform.clone();
                    let token = token.clone();
                    let channel_id = channel.id.clone();
                    throttler
                        .enqueue(
                            format!("search:{}", channel.id),
                            move || async move {
                                platform
                                    .list_recent_videos(&token, &channel_id, per_channel)
                                    .await
                            },
                            PRIORITY_FEED,
                        )
                        .await?
                };
                quota.increment(COST_SEARCH_LIST).await;
                items.extend(batch);
            }

            // Newest first; the sort is stable, so equal timestamps keep
            // their discovery order.
            items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
            Ok(items)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::cache::{CachePolicy, ResourceKind};
    use crate::config::QuotaConfig;
    use crate::error::ApiError;
    use crate::platform::{CaptionFormat, CaptionTrack, ChannelRef, VideoDetails};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockPlatform {
        channels: Vec<ChannelRef>,
        videos_by_channel: StdMutex<std::collections::HashMap<String, Vec<VideoItem>>>,
        subscription_error: Option<ApiError>,
        pub subscription_calls: AtomicUsize,
        pub search_calls: AtomicUsize,
    }

    impl MockPlatform {
        fn new(channels: Vec<ChannelRef>) -> Self {
            Self {
                channels,
                videos_by_channel: StdMutex::new(std::collections::HashMap::new()),
                subscription_error: None,
                subscription_calls: AtomicUsize::new(0),
                search_calls: AtomicUsize::new(0),
            }
        }

        fn failing(error: ApiError) -> Self {
            let mut mock = Self::new(Vec::new());
            mock.subscription_error = Some(error);
            mock
        }

        fn add_videos(&self, channel_id: &str, videos: Vec<VideoItem>) {
            self.videos_by_channel
                .lock()
                .unwrap()
                .insert(channel_id.to_string(), videos);
        }
    }

    #[async_trait]
    impl VideoPlatform for MockPlatform {
        async fn list_subscriptions(
            &self,
            _token: &str,
            _max_results: usize,
        ) -> Result<Vec<ChannelRef>, ApiError> {
            self.subscription_calls.fetch_add(1, Ordering::SeqCst);
            match &self.subscription_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.channels.clone()),
            }
        }

        async fn list_recent_videos(
            &self,
            _token: &str,
            channel_id: &str,
            max_results: usize,
        ) -> Result<Vec<VideoItem>, ApiError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let videos = self
                .videos_by_channel
                .lock()
                .unwrap()
                .get(channel_id)
                .cloned()
                .unwrap_or_default();
            Ok(videos.into_iter().take(max_results).collect())
        }

        async fn list_caption_tracks(
            &self,
            _token: &str,
            _video_id: &str,
        ) -> Result<Vec<CaptionTrack>, ApiError> {
            unimplemented!("not used by the feed fetcher")
        }

        async fn download_caption(
            &self,
            _token: &str,
            _track_id: &str,
            _format: CaptionFormat,
        ) -> Result<String, ApiError> {
            unimplemented!("not used by the feed fetcher")
        }

        async fn video_details(
            &self,
            _token: &str,
            _video_id: &str,
        ) -> Result<VideoDetails, ApiError> {
            unimplemented!("not used by the feed fetcher")
        }
    }

    struct MockAuth {
        pub invalidated: AtomicUsize,
    }

    impl MockAuth {
        fn new() -> Self {
            Self {
                invalidated: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthProvider for MockAuth {
        async fn validate(&self, token: &str) -> Result<Principal, ApiError> {
            Ok(Principal {
                subject: token.to_string(),
                email: None,
            })
        }

        async fn has_caption_scope(&self, _token: &str) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn invalidate(&self, _token: &str) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn video(id: &str, hours_ago: i64) -> VideoItem {
        VideoItem {
            id: id.to_string(),
            title: format!("video {}", id),
            thumbnail: String::new(),
            published_at: Utc::now() - ChronoDuration::hours(hours_ago),
            video_url: VideoItem::watch_url(id),
        }
    }

    fn fetcher(
        platform: Arc<MockPlatform>,
        auth: Arc<MockAuth>,
        quota: QuotaTracker,
    ) -> (FeedFetcher, CacheStore<Vec<VideoItem>>) {
        let cache: CacheStore<Vec<VideoItem>> =
            CacheStore::new(ResourceKind::Feed, CachePolicy::default(), None);
        let config = Config::default();
        let throttler = RequestThrottler::new(&crate::config::ThrottleConfig {
            max_requests_per_minute: 600,
            min_delay_ms: 0,
        });
        let fetcher = FeedFetcher::new(
            platform,
            auth,
            cache.clone(),
            quota,
            throttler,
            &config,
        );
        (fetcher, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_hit_issues_zero_live_calls() {
        let platform = Arc::new(MockPlatform::new(vec![ChannelRef {
            id: "ch1".to_string(),
            title: "Channel".to_string(),
        }]));
        let quota = QuotaTracker::new(&QuotaConfig::default(), None);
        let (fetcher, cache) = fetcher(platform.clone(), Arc::new(MockAuth::new()), quota);

        let credential = Credential::new("token-a");
        cache
            .set(&key::feed_key(&credential.token), vec![video("v1", 1)])
            .await;

        let result = fetcher.fetch(&credential).await.unwrap();
        assert!(!result.degraded);
        assert_eq!(result.value.len(), 1);
        assert_eq!(platform.subscription_calls.load(Ordering::SeqCst), 0);
        assert_eq!(platform.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn live_scan_is_bounded_sorted_and_charged() {
        let channels: Vec<ChannelRef> = (1..=5)
            .map(|i| ChannelRef {
                id: format!("ch{}", i),
                title: format!("Channel {}", i),
            })
            .collect();
        let platform = Arc::new(MockPlatform::new(channels));
        platform.add_videos("ch1", vec![video("a", 10), video("b", 1)]);
        platform.add_videos("ch2", vec![video("c", 5)]);
        platform.add_videos("ch3", vec![video("d", 2)]);
        platform.add_videos("ch4", vec![video("never-scanned", 0)]);

        let quota = QuotaTracker::new(&QuotaConfig::default(), None);
        let (fetcher, cache) = fetcher(platform.clone(), Arc::new(MockAuth::new()), quota.clone());

        let credential = Credential::new("token-a");
        let result = fetcher.fetch(&credential).await.unwrap();

        // Only the first three channels are scanned.
        assert_eq!(platform.search_calls.load(Ordering::SeqCst), 3);
        let ids: Vec<&str> = result.value.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);

        // 1 unit for subscriptions + 100 per channel search.
        assert_eq!(quota.current_usage().await.units_consumed, 301);

        // Write-through: the next fetch is served from cache.
        assert!(cache
            .get(&key::feed_key(&credential.token), false)
            .await
            .is_some());
        fetcher.fetch(&credential).await.unwrap();
        assert_eq!(platform.subscription_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn near_quota_prefers_expired_cache_over_live_call() {
        let platform = Arc::new(MockPlatform::new(Vec::new()));
        let quota = QuotaTracker::new(&QuotaConfig::default(), None);
        quota.increment(8001).await;
        let (fetcher, cache) = fetcher(platform.clone(), Arc::new(MockAuth::new()), quota);

        let credential = Credential::new("token-a");
        cache
            .set_with_timestamp(
                &key::feed_key(&credential.token),
                vec![video("old", 100)],
                Utc::now() - ChronoDuration::hours(48),
            )
            .await;

        let result = fetcher.fetch(&credential).await.unwrap();
        assert!(result.degraded);
        assert_eq!(result.value[0].id, "old");
        assert_eq!(platform.subscription_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_error_serves_emergency_cache_as_degraded() {
        let platform = Arc::new(MockPlatform::failing(ApiError::new(
            403,
            Some("quotaExceeded".to_string()),
            "quota exceeded",
        )));
        let quota = QuotaTracker::new(&QuotaConfig::default(), None);
        let (fetcher, cache) = fetcher(platform, Arc::new(MockAuth::new()), quota);

        let credential = Credential::new("token-a");
        cache
            .set_with_timestamp(
                &key::feed_key(&credential.token),
                vec![video("stale", 99)],
                Utc::now() - ChronoDuration::hours(48),
            )
            .await;

        let result = fetcher.fetch(&credential).await.unwrap();
        assert!(result.degraded);
        assert_eq!(result.value[0].id, "stale");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_token_surfaces_and_invalidates() {
        let platform = Arc::new(MockPlatform::failing(ApiError::new(
            401,
            Some("invalid_token".to_string()),
            "token expired",
        )));
        let auth = Arc::new(MockAuth::new());
        let quota = QuotaTracker::new(&QuotaConfig::default(), None);
        let (fetcher, _cache) = fetcher(platform, auth.clone(), quota);

        let err = fetcher.fetch(&Credential::new("token-a")).await.unwrap_err();
        assert!(matches!(err, FetchError::AuthInvalid(_)));
        assert_eq!(auth.invalidated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn equal_timestamps_keep_discovery_order() {
        let shared = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let channels = vec![
            ChannelRef {
                id: "ch1".to_string(),
                title: "one".to_string(),
            },
            ChannelRef {
                id: "ch2".to_string(),
                title: "two".to_string(),
            },
        ];
        let platform = Arc::new(MockPlatform::new(channels));
        let mut first = video("first", 0);
        first.published_at = shared;
        let mut second = video("second", 0);
        second.published_at = shared;
        platform.add_videos("ch1", vec![first]);
        platform.add_videos("ch2", vec![second]);

        let quota = QuotaTracker::new(&QuotaConfig::default(), None);
        let (fetcher, _cache) = fetcher(platform, Arc::new(MockAuth::new()), quota);

        let result = fetcher.fetch(&Credential::new("token-a")).await.unwrap();
        let ids: Vec<&str> = result.value.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
