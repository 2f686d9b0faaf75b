use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::CacheStore;

/// Cleanup seam so the cleaner can drive stores of different value types.
#[async_trait]
pub trait MaintainedCache: Send + Sync {
    async fn run_cleanup(&self) -> usize;
    fn label(&self) -> &'static str;
}

#[async_trait]
impl<T> MaintainedCache for CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn run_cleanup(&self) -> usize {
        self.cleanup().await
    }

    fn label(&self) -> &'static str {
        self.kind().namespace()
    }
}

/// Periodic cleanup over every registered cache store.
pub struct CacheCleaner {
    caches: Vec<Arc<dyn MaintainedCache>>,
    interval: Duration,
}

impl CacheCleaner {
    pub fn new(caches: Vec<Arc<dyn MaintainedCache>>, interval: Duration) -> Self {
        Self { caches, interval }
    }

    pub fn start(self) {
        info!("starting cache cleaner with interval {:?}", self.interval);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.interval).await;
                debug!("running cache cleanup cycle");
                for cache in &self.caches {
                    let removed = cache.run_cleanup().await;
                    if removed > 0 {
                        debug!("{}: removed {} entries", cache.label(), removed);
                    }
                }
            }
        });
    }
}
