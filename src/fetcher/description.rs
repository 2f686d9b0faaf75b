use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{AuthProvider, Credential};
use crate::cache::{key, CacheStore};
use crate::classify;
use crate::config::Config;
use crate::error::FetchError;
use crate::fallback::{self, Fetched, Strategy};
use crate::platform::{VideoDetails, VideoPlatform, COST_VIDEOS_LIST};
use crate::quota::QuotaTracker;
use crate::throttle::RequestThrottler;

use super::{emergency_lookup, PRIORITY_CAPTION};

/// Fetches a video's title/description/publish metadata.
pub struct DescriptionFetcher {
    platform: Arc<dyn VideoPlatform>,
    auth: Arc<dyn AuthProvider>,
    cache: CacheStore<VideoDetails>,
    quota: QuotaTracker,
    throttler: RequestThrottler,
    prefer_cache: bool,
}

impl DescriptionFetcher {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        auth: Arc<dyn AuthProvider>,
        cache: CacheStore<VideoDetails>,
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
        }
    }

    pub async fn fetch(
        &self,
        credential: &Credential,
        video_id: &str,
    ) -> Result<Fetched<VideoDetails>, FetchError> {
        let cache_key = key::description_key(video_id);

        if let Some(details) = self.cache.get(&cache_key, false).await {
            debug!("serving metadata for {} from cache", video_id);
            return Ok(Fetched::fresh(details));
        }

        if self.prefer_cache && self.quota.is_approaching_limit().await {
            if let Some(details) = self.cache.get(&cache_key, true).await {
                warn!("approaching quota limit, serving cached metadata for {}", video_id);
                return Ok(Fetched::degraded(details));
            }
        }

        let outcome = fallback::execute(
            self.live_details(credential.token.clone(), video_id.to_string()),
            Vec::new(),
            classify::classify,
            emergency_lookup(&self.cache, &cache_key),
        )
        .await;

        match outcome {
            Ok(fetched) => {
                if !fetched.degraded {
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

    fn live_details(&self, token: String, video_id: String) -> Strategy<VideoDetails> {
        let platform = self.platform.clone();
        let throttler = self.throttler.clone();
        let quota = self.quota.clone();

        Box::pin(async move {
            let details = {
                let platform = platform.clone();
                throttler
                    .enqueue(
                        format!("videos:{}", video_id),
                        move || async move { platform.video_details(&token, &video_id).await },
                        PRIORITY_CAPTION,
                    )
                    .await?
            };
            quota.increment(COST_VIDEOS_LIST).await;
            Ok(details)
        })
    }
}
