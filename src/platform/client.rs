use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, AUTHORIZATION};
use hyper::{Body, Client, Method, Request};
use hyper_tls::HttpsConnector;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;

use super::types::{CaptionFormat, CaptionTrack, ChannelRef, VideoDetails, VideoItem};
use super::VideoPlatform;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// hyper-based client for the video platform API.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client<HttpsConnector<HttpConnector>>,
    base: String,
    timeout: Duration,
}

impl YouTubeClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base(DEFAULT_API_BASE, timeout)
    }

    pub fn with_base(base: impl Into<String>, timeout: Duration) -> Self {
        let https = HttpsConnector::new();
        Self {
            client: Client::builder().build::<_, Body>(https),
            base: base.into(),
            timeout,
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}/{}", self.base, path))
            .map_err(|e| ApiError::transport(format!("invalid API URL: {}", e)))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    async fn get_bytes(&self, url: Url, token: &str) -> Result<bytes::Bytes, ApiError> {
        debug!("GET {}", url.path());
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .body(Body::empty())
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ApiError::transport(e.to_string()))?;
            let status = response.status().as_u16();
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|e| ApiError::transport(e.to_string()))?;
            if !(200..300).contains(&status) {
                let err = parse_api_error(status, &body);
                warn!("platform call failed: {}", err);
                return Err(err);
            }
            Ok(body)
        };

        // 每个请求独立的超时预算
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ApiError::timeout(self.timeout))?
    }

    async fn get_json<D: DeserializeOwned>(&self, url: Url, token: &str) -> Result<D, ApiError> {
        let body = self.get_bytes(url, token).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::transport(format!("failed to parse platform response: {}", e)))
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn list_subscriptions(
        &self,
        token: &str,
        max_results: usize,
    ) -> Result<Vec<ChannelRef>, ApiError> {
        let max = max_results.to_string();
        let url = self.endpoint(
            "subscriptions",
            &[("part", "snippet"), ("mine", "true"), ("maxResults", &max)],
        )?;
        let listing: SubscriptionListing = self.get_json(url, token).await?;

        Ok(listing
            .items
            .into_iter()
            .filter_map(|item| {
                let channel_id = item.snippet.resource_id?.channel_id?;
                Some(ChannelRef {
                    id: channel_id,
                    title: item.snippet.title,
                })
            })
            .collect())
    }

    async fn list_recent_videos(
        &self,
        token: &str,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<VideoItem>, ApiError> {
        let max = max_results.to_string();
        let url = self.endpoint(
            "search",
            &[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("maxResults", &max),
                ("order", "date"),
                ("type", "video"),
            ],
        )?;
        let listing: SearchListing = self.get_json(url, token).await?;

        Ok(listing
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                let snippet = item.snippet?;
                Some(VideoItem {
                    video_url: VideoItem::watch_url(&video_id),
                    id: video_id,
                    title: snippet.title,
                    thumbnail: snippet
                        .thumbnails
                        .and_then(|t| t.high)
                        .map(|t| t.url)
                        .unwrap_or_default(),
                    published_at: snippet.published_at,
                })
            })
            .collect())
    }

    async fn list_caption_tracks(
        &self,
        token: &str,
        video_id: &str,
    ) -> Result<Vec<CaptionTrack>, ApiError> {
        let url = self.endpoint("captions", &[("part", "snippet"), ("videoId", video_id)])?;
        let listing: CaptionListing = self.get_json(url, token).await?;

        Ok(listing
            .items
            .into_iter()
            .map(|item| CaptionTrack {
                id: item.id,
                language: item.snippet.language,
                track_kind: item.snippet.track_kind,
            })
            .collect())
    }

    async fn download_caption(
        &self,
        token: &str,
        track_id: &str,
        format: CaptionFormat,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(&format!("captions/{}", track_id), &[("tfmt", format.as_str())])?;
        let body = self.get_bytes(url, token).await?;
        String::from_utf8(body.to_vec())
            .map_err(|e| ApiError::transport(format!("caption track is not valid UTF-8: {}", e)))
    }

    async fn video_details(&self, token: &str, video_id: &str) -> Result<VideoDetails, ApiError> {
        let url = self.endpoint("videos", &[("part", "snippet"), ("id", video_id)])?;
        let listing: VideoListing = self.get_json(url, token).await?;

        let item = listing.items.into_iter().next().ok_or_else(|| {
            ApiError::new(
                404,
                Some("videoNotFound".to_string()),
                format!("video {} not found", video_id),
            )
        })?;
        Ok(VideoDetails {
            id: item.id,
            title: item.snippet.title,
            description: item.snippet.description,
            published_at: item.snippet.published_at,
        })
    }
}

/// Extract the structured error shape the platform returns:
/// `{"error": {"code": ..., "message": ..., "errors": [{"reason": ...}]}}`.
/// Falls back to the raw body text when the shape does not parse.
fn parse_api_error(status: u16, body: &[u8]) -> ApiError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorPayload,
    }
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: Option<String>,
        #[serde(default)]
        errors: Vec<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        reason: Option<String>,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => {
            let reason = parsed.error.errors.into_iter().find_map(|d| d.reason);
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| format!("platform returned HTTP {}", status));
            ApiError::new(status, reason, message)
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let message = if text.trim().is_empty() {
                format!("platform returned HTTP {}", status)
            } else {
                text.into_owned()
            };
            ApiError::new(status, None, message)
        }
    }
}

// ---- wire shapes ----

#[derive(Deserialize)]
struct SubscriptionListing {
    #[serde(default)]
    items: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    snippet: SubscriptionSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionSnippet {
    title: String,
    resource_id: Option<SubscriptionResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionResource {
    channel_id: Option<String>,
}

#[derive(Deserialize)]
struct SearchListing {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<SearchSnippet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    title: String,
    published_at: DateTime<Utc>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
struct CaptionListing {
    #[serde(default)]
    items: Vec<CaptionItem>,
}

#[derive(Deserialize)]
struct CaptionItem {
    id: String,
    snippet: CaptionSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionSnippet {
    language: String,
    track_kind: Option<String>,
}

#[derive(Deserialize)]
struct VideoListing {
    #[serde(default)]
    items: Vec<VideoListingItem>,
}

#[derive(Deserialize)]
struct VideoListingItem {
    id: String,
    snippet: VideoSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::error::ErrorKind;

    #[test]
    fn structured_error_body_parses_reason() {
        let body = br#"{
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{"reason": "quotaExceeded", "domain": "youtube.quota"}]
            }
        }"#;
        let err = parse_api_error(403, body);
        assert_eq!(err.status, 403);
        assert_eq!(err.reason.as_deref(), Some("quotaExceeded"));
        assert_eq!(classify(&err), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn unstructured_error_body_keeps_the_text() {
        let err = parse_api_error(500, b"upstream had a bad day");
        assert_eq!(err.status, 500);
        assert_eq!(err.reason, None);
        assert_eq!(err.message, "upstream had a bad day");
    }

    #[test]
    fn empty_error_body_reports_the_status() {
        let err = parse_api_error(502, b"");
        assert_eq!(err.message, "platform returned HTTP 502");
    }

    #[test]
    fn endpoint_builds_query_parameters() {
        let client = YouTubeClient::new(Duration::from_secs(15));
        let url = client
            .endpoint("captions", &[("part", "snippet"), ("videoId", "abc123")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/youtube/v3/captions?part=snippet&videoId=abc123"
        );
    }

    #[test]
    fn search_listing_deserializes() {
        let body = br#"{
            "items": [
                {
                    "id": {"videoId": "vid1"},
                    "snippet": {
                        "title": "First",
                        "publishedAt": "2024-05-01T10:00:00Z",
                        "thumbnails": {"high": {"url": "https://i.ytimg.com/vi/vid1/hq.jpg"}}
                    }
                },
                {"id": {}, "snippet": null}
            ]
        }"#;
        let listing: SearchListing = serde_json::from_slice(body).unwrap();
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].id.video_id.as_deref(), Some("vid1"));
    }
}
