use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{AuthProvider, Credential};
use crate::cache::{key, CacheStore};
use crate::classify;
use crate::config::Config;
use crate::error::{ApiError, FetchError};
use crate::fallback::{self, Alternative, Fetched, Strategy};
use crate::platform::{
    CaptionFormat, VideoPlatform, COST_CAPTIONS_DOWNLOAD, COST_CAPTIONS_LIST, COST_VIDEOS_LIST,
};
use crate::quota::QuotaTracker;
use crate::throttle::RequestThrottler;

use super::{emergency_lookup, PRIORITY_CAPTION};

/// Fetches a video's caption text. The primary strategy downloads the
/// preferred track in the preferred format; alternatives retry the remaining
/// formats, and — only when enabled — substitute the video description for a
/// transcript that cannot be had.
pub struct CaptionFetcher {
    platform: Arc<dyn VideoPlatform>,
    auth: Arc<dyn AuthProvider>,
    cache: CacheStore<String>,
    quota: QuotaTracker,
    throttler: RequestThrottler,
    prefer_cache: bool,
    preferred_language: String,
    description_fallback: bool,
}

impl CaptionFetcher {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        auth: Arc<dyn AuthProvider>,
        cache: CacheStore<String>,
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
            preferred_language: config.captions.preferred_language.clone(),
            description_fallback: config.captions.description_fallback,
        }
    }

    pub async fn fetch(
        &self,
        credential: &Credential,
        video_id: &str,
    ) -> Result<Fetched<String>, FetchError> {
        let cache_key = key::caption_key(video_id);

        if let Some(text) = self.cache.get(&cache_key, false).await {
            debug!("serving captions for {} from cache", video_id);
            return Ok(Fetched::fresh(text));
        }

        if self.prefer_cache && self.quota.is_approaching_limit().await {
            if let Some(text) = self.cache.get(&cache_key, true).await {
                warn!("approaching quota limit, serving cached captions for {}", video_id);
                return Ok(Fetched::degraded(text));
            }
        }

        // 范围不足时直接走权限失败路径，不浪费配额
        let scoped = match self.auth.has_caption_scope(&credential.token).await {
            Ok(scoped) => scoped,
            Err(e) => {
                warn!("caption scope check failed, attempting live call anyway: {}", e);
                true
            }
        };
        let primary: Strategy<String> = if scoped {
            self.caption_download(credential.token.clone(), video_id.to_string(), CaptionFormat::Srt)
        } else {
            Box::pin(async { Err(ApiError::insufficient_scope()) })
        };

        let mut alternatives = Vec::new();
        for format in CaptionFormat::ALL.into_iter().skip(1) {
            alternatives.push(Alternative::new(
                format_label(format),
                self.caption_download(credential.token.clone(), video_id.to_string(), format),
            ));
        }
        if self.description_fallback {
            alternatives.push(Alternative::new(
                "video description",
                self.description_text(credential.token.clone(), video_id.to_string()),
            ));
        }

        let outcome = fallback::execute(
            primary,
            alternatives,
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
            Err(FetchError::NotAvailable(message)) if self.description_fallback => {
                // Legacy behavior behind the flag: a video without captions
                // still gets its description as a degraded stand-in.
                match self
                    .description_text(credential.token.clone(), video_id.to_string())
                    .await
                {
                    Ok(text) => {
                        warn!("no captions for {}, substituting the video description", video_id);
                        Ok(Fetched::degraded(text))
                    }
                    Err(e) => {
                        debug!("description substitute also failed: {}", e);
                        Err(FetchError::NotAvailable(message))
                    }
                }
            }
            Err(err) => {
                if matches!(err, FetchError::AuthInvalid(_)) {
                    self.auth.invalidate(&credential.token).await;
                }
                Err(err)
            }
        }
    }

    fn caption_download(
        &self,
        token: String,
        video_id: String,
        format: CaptionFormat,
    ) -> Strategy<String> {
        let platform = self.platform.clone();
        let throttler = self.throttler.clone();
        let quota = self.quota.clone();
        let preferred_language = self.preferred_language.clone();

        Box::pin(async move {
            let tracks = {
                let platform = platform.clone();
                let token = token.clone();
                let video_id = video_id.clone();
                throttler
                    .enqueue(
                        format!("captions:{}", video_id),
                        move || async move { platform.list_caption_tracks(&token, &video_id).await },
                        PRIORITY_CAPTION,
                    )
                    .await?
            };
            quota.increment(COST_CAPTIONS_LIST).await;

            if tracks.is_empty() {
                return Err(ApiError::captions_not_available(&video_id));
            }
            let track = tracks
                .iter()
                .find(|t| t.language == preferred_language)
                .or_else(|| tracks.first())
                .ok_or_else(|| ApiError::captions_not_available(&video_id))?;

            let content = {
                let platform = platform.clone();
                let token = token.clone();
                let track_id = track.id.clone();
                throttler
                    .enqueue(
                        format!("caption-download:{}:{}", track_id, format.as_str()),
                        move || async move { platform.download_caption(&token, &track_id, format).await },
                        PRIORITY_CAPTION,
                    )
                    .await?
            };
            quota.increment(COST_CAPTIONS_DOWNLOAD).await;
            Ok(content)
        })
    }

    fn description_text(&self, token: String, video_id: String) -> Strategy<String> {
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
            Ok(details.description)
        })
    }
}

fn format_label(format: CaptionFormat) -> &'static str {
    match format {
        CaptionFormat::Srt => "caption format srt",
        CaptionFormat::Vtt => "caption format vtt",
        CaptionFormat::Sbv => "caption format sbv",
    }
}
