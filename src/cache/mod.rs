use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

mod cleaner;
mod entry;
mod error;
pub mod key;
mod persistent;
mod policy;

pub use cleaner::{CacheCleaner, MaintainedCache};
pub use entry::CacheEntry;
pub use error::CacheError;
pub use persistent::{PersistedEntry, PersistentStore};
pub use policy::{CachePolicy, ResourceKind};

#[derive(Debug)]
struct Slot<T> {
    entry: CacheEntry<T>,
    size: u64,
}

#[derive(Debug)]
struct CacheState<T> {
    entries: HashMap<String, Slot<T>>,
    approx_size: u64,
}

/// In-memory cache for one resource kind, optionally mirrored to a
/// persistent namespace. Entries past their TTL stay physically present so
/// emergency reads (`ignore_expiry`) can still serve them after a failed
/// live call.
#[derive(Debug, Clone)]
pub struct CacheStore<T> {
    kind: ResourceKind,
    policy: CachePolicy,
    state: Arc<RwLock<CacheState<T>>>,
    mirror: Option<Arc<PersistentStore>>,
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub approx_size: u64,
    pub max_size: u64,
}

impl<T> CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(kind: ResourceKind, policy: CachePolicy, mirror: Option<Arc<PersistentStore>>) -> Self {
        debug!("initializing {} cache", kind.namespace());
        Self {
            kind,
            policy,
            state: Arc::new(RwLock::new(CacheState {
                entries: HashMap::new(),
                approx_size: 0,
            })),
            mirror,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Read a value. With `ignore_expiry` false this is a normal TTL-checked
    /// read; with true it returns the value at any age as long as the key
    /// exists — used only when a live call has already failed.
    pub async fn get(&self, key: &str, ignore_expiry: bool) -> Option<T> {
        {
            let state = self.state.read().await;
            if let Some(slot) = state.entries.get(key) {
                if ignore_expiry || self.policy.is_valid(&slot.entry, self.kind) {
                    debug!("cache hit for key: {}", key);
                    return Some(slot.entry.value.clone());
                }
                debug!("cache entry expired for key: {}", key);
                return None;
            }
        }

        // 主缓存未命中时回源到持久层
        let restored = self.restore_from_mirror(key).await?;
        if ignore_expiry || self.policy.is_valid(&restored, self.kind) {
            Some(restored.value)
        } else {
            debug!("mirrored entry expired for key: {}", key);
            None
        }
    }

    /// Overwrite unconditionally, stamped with the current time.
    pub async fn set(&self, key: &str, value: T) {
        self.set_with_timestamp(key, value, Utc::now()).await;
    }

    /// Overwrite with an explicit timestamp. Used by the mirror restore path
    /// so a reloaded entry keeps its original age.
    pub async fn set_with_timestamp(&self, key: &str, value: T, stored_at: DateTime<Utc>) {
        let serialized = match serde_json::to_value(&value) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("failed to serialize cache value for key {}: {}", key, e);
                None
            }
        };
        let size = serialized
            .as_ref()
            .map(|json| (json.to_string().len() + key.len()) as u64)
            .unwrap_or(0);

        {
            let mut state = self.state.write().await;
            let slot = Slot {
                entry: CacheEntry::with_timestamp(value, stored_at),
                size,
            };
            if let Some(old) = state.entries.insert(key.to_string(), slot) {
                state.approx_size = state.approx_size.saturating_sub(old.size);
            }
            state.approx_size += size;
        }

        // 镜像写失败不影响主缓存
        if let (Some(mirror), Some(json)) = (&self.mirror, serialized) {
            let persisted = PersistedEntry {
                value: json,
                timestamp: stored_at,
            };
            if let Err(e) = mirror.write_entry(self.kind.namespace(), key, persisted).await {
                warn!("failed to mirror cache write for key {}: {}", key, e);
            }
        }
    }

    pub async fn remove(&self, key: &str) {
        {
            let mut state = self.state.write().await;
            if let Some(old) = state.entries.remove(key) {
                state.approx_size = state.approx_size.saturating_sub(old.size);
            }
        }
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.remove_entry(self.kind.namespace(), key).await {
                warn!("failed to remove mirrored entry for key {}: {}", key, e);
            }
        }
    }

    /// Drop expired entries, then evict oldest-first until the aggregate
    /// size is back under the ceiling. Only runs when auto-cleanup is
    /// enabled — with it off, expired entries are kept for emergency reads
    /// indefinitely. Returns the number of removed entries.
    pub async fn cleanup(&self) -> usize {
        if !self.policy.auto_cleanup {
            return 0;
        }

        let mut removed_keys = Vec::new();
        {
            let mut state = self.state.write().await;

            // 找出过期条目
            let expired: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, slot)| !self.policy.is_valid(&slot.entry, self.kind))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                if let Some(old) = state.entries.remove(&key) {
                    state.approx_size = state.approx_size.saturating_sub(old.size);
                    removed_keys.push(key);
                }
            }

            // 超出大小上限时从最旧的开始删
            while state.approx_size > self.policy.max_size_bytes && !state.entries.is_empty() {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, slot)| slot.entry.stored_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(key) => {
                        if let Some(old) = state.entries.remove(&key) {
                            state.approx_size = state.approx_size.saturating_sub(old.size);
                            removed_keys.push(key);
                        }
                    }
                    None => break,
                }
            }
        }

        if let Some(mirror) = &self.mirror {
            for key in &removed_keys {
                if let Err(e) = mirror.remove_entry(self.kind.namespace(), key).await {
                    warn!("failed to remove mirrored entry for key {}: {}", key, e);
                }
            }
        }

        if !removed_keys.is_empty() {
            info!(
                "{} cleanup removed {} entries",
                self.kind.namespace(),
                removed_keys.len()
            );
        }
        removed_keys.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            total_entries: state.entries.len(),
            approx_size: state.approx_size,
            max_size: self.policy.max_size_bytes,
        }
    }

    async fn restore_from_mirror(&self, key: &str) -> Option<CacheEntry<T>> {
        let mirror = self.mirror.as_ref()?;
        let persisted = match mirror.read_entry(self.kind.namespace(), key).await {
            Ok(found) => found?,
            Err(e) => {
                warn!("mirror read failed for key {}: {}", key, e);
                return None;
            }
        };
        let value: T = match serde_json::from_value(persisted.value) {
            Ok(value) => value,
            Err(e) => {
                warn!("mirrored entry for key {} is unreadable: {}", key, e);
                return None;
            }
        };

        debug!("restored key {} from persistent mirror", key);
        let entry = CacheEntry::with_timestamp(value.clone(), persisted.timestamp);
        {
            let mut state = self.state.write().await;
            // Another task may have populated the key while the mirror read
            // was in flight; the in-memory entry wins.
            if !state.entries.contains_key(key) {
                let size = serde_json::to_value(&value)
                    .map(|json| (json.to_string().len() + key.len()) as u64)
                    .unwrap_or(0);
                state.approx_size += size;
                state.entries.insert(
                    key.to_string(),
                    Slot {
                        entry: entry.clone(),
                        size,
                    },
                );
            }
        }
        Some(entry)
    }
}
