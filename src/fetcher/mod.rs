use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheStore;

mod caption;
mod description;
mod feed;

pub use caption::CaptionFetcher;
pub use description::DescriptionFetcher;
pub use feed::FeedFetcher;

// Feed refreshes are user-facing; caption and metadata work queues behind.
pub(crate) const PRIORITY_FEED: i32 = 5;
pub(crate) const PRIORITY_CAPTION: i32 = 10;

/// Emergency lookup closure for the fallback chain: an any-age read of the
/// fetcher's own cache entry.
pub(crate) fn emergency_lookup<T>(
    cache: &CacheStore<T>,
    key: &str,
) -> impl Fn() -> Pin<Box<dyn Future<Output = Option<T>> + Send>>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let cache = cache.clone();
    let key = key.to_string();
    move || {
        let cache = cache.clone();
        let key = key.clone();
        Box::pin(async move { cache.get(&key, true).await })
    }
}
