use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{key, CacheStore};
use crate::classify;
use crate::config::SummarizerConfig;
use crate::error::{ApiError, ErrorKind, FetchError};
use crate::fallback::Fetched;

pub mod chunk;
mod client;

pub use client::{OpenAiSummarizer, Summarizer};

/// Iterative map-reduce summarization with its own result cache.
///
/// Texts under the chunk threshold are summarized in one call. Longer texts
/// are chunked, each chunk summarized in order, and the partial summaries
/// reduced in fixed-size batches until one remains (or the remainder fits a
/// direct pass). Chunk calls are issued sequentially to bound concurrent
/// load on the summarization backend.
pub struct SummaryOrchestrator {
    summarizer: Arc<dyn Summarizer>,
    cache: CacheStore<String>,
    max_chunk_chars: usize,
    reduce_batch_size: usize,
}

impl SummaryOrchestrator {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        cache: CacheStore<String>,
        config: &SummarizerConfig,
    ) -> Self {
        Self {
            summarizer,
            cache,
            // 粗略估算：token 预算 × 每 token 字符数
            max_chunk_chars: config.max_tokens_per_summarization * config.chars_per_token,
            reduce_batch_size: config.reduce_batch_size,
        }
    }

    /// Summarize a video's transcript, serving and refreshing the cached
    /// summary keyed by video identity. When regeneration fails on a
    /// quota/permission/auth error and a cached summary exists, the cached
    /// value is served marked degraded (it may be outdated) instead of
    /// failing the request.
    pub async fn summarize_video(
        &self,
        video_id: &str,
        transcript: &str,
    ) -> Result<Fetched<String>, FetchError> {
        let cache_key = key::summary_key(video_id);

        if let Some(summary) = self.cache.get(&cache_key, false).await {
            debug!("serving summary for {} from cache", video_id);
            return Ok(Fetched::fresh(summary));
        }

        match self.reduce(transcript).await {
            Ok(summary) => {
                info!("generated summary for {}", video_id);
                self.cache.set(&cache_key, summary.clone()).await;
                Ok(Fetched::fresh(summary))
            }
            Err(err) => {
                let kind = classify::classify(&err);
                if matches!(
                    kind,
                    ErrorKind::QuotaExceeded | ErrorKind::PermissionDenied | ErrorKind::AuthInvalid
                ) {
                    if let Some(stale) = self.cache.get(&cache_key, true).await {
                        warn!(
                            "summary regeneration for {} failed ({:?}), serving cached summary (may be outdated)",
                            video_id, kind
                        );
                        return Ok(Fetched::degraded(stale));
                    }
                }
                Err(FetchError::from_kind(kind, err.message))
            }
        }
    }

    async fn reduce(&self, text: &str) -> Result<String, ApiError> {
        if text.len() < self.max_chunk_chars {
            return self.summarizer.summarize(text).await;
        }

        let chunks = chunk::split_text(text, self.max_chunk_chars);
        debug!("summarizing {} chunks", chunks.len());
        let mut partials = Vec::with_capacity(chunks.len());
        for piece in &chunks {
            partials.push(self.summarizer.summarize(piece).await?);
        }

        while partials.len() > 1 {
            let combined = partials.join("\n\n");
            if combined.len() < self.max_chunk_chars {
                return self.summarizer.summarize(&combined).await;
            }

            // 按固定批量归并部分摘要
            let mut next = Vec::new();
            for batch in partials.chunks(self.reduce_batch_size) {
                next.push(self.summarizer.summarize(&batch.join("\n\n")).await?);
            }
            debug!("reduced {} partial summaries to {}", partials.len(), next.len());
            partials = next;
        }

        partials
            .pop()
            .ok_or_else(|| ApiError::transport("nothing to summarize"))
    }
}
