use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::CacheError;

/// One persisted entry: the serialized value plus its original write time.
/// The timestamp travels with the value so TTL decisions survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Durable key-value mirror backed by one JSON file per namespace
/// (`cached_feed.json`, `cached_summaries.json`, ...). Each file holds a
/// single object mapping keys to `{ value, timestamp }` records.
#[derive(Debug)]
pub struct PersistentStore {
    root: PathBuf,
    // 文件读改写需要串行化
    io_lock: Mutex<()>,
}

impl PersistentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            io_lock: Mutex::new(()),
        }
    }

    pub async fn init(&self) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.root).await?;
        debug!("persistent store ready at {:?}", self.root);
        Ok(())
    }

    fn namespace_path(&self, namespace: &str) -> Result<PathBuf, CacheError> {
        if namespace.is_empty() || namespace.contains(&['/', '\\', '.'][..]) {
            return Err(CacheError::InvalidPath(namespace.to_string()));
        }
        Ok(self.root.join(format!("{}.json", namespace)))
    }

    pub async fn read_namespace(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, PersistedEntry>, CacheError> {
        let path = self.namespace_path(namespace)?;
        let _guard = self.io_lock.lock().await;
        Self::load(&path).await
    }

    pub async fn read_entry(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<PersistedEntry>, CacheError> {
        let mut entries = self.read_namespace(namespace).await?;
        Ok(entries.remove(key))
    }

    pub async fn write_entry(
        &self,
        namespace: &str,
        key: &str,
        entry: PersistedEntry,
    ) -> Result<(), CacheError> {
        let path = self.namespace_path(namespace)?;
        let _guard = self.io_lock.lock().await;
        let mut entries = Self::load(&path).await?;
        entries.insert(key.to_string(), entry);
        Self::save(&path, &entries).await
    }

    pub async fn remove_entry(&self, namespace: &str, key: &str) -> Result<(), CacheError> {
        let path = self.namespace_path(namespace)?;
        let _guard = self.io_lock.lock().await;
        let mut entries = Self::load(&path).await?;
        if entries.remove(key).is_some() {
            Self::save(&path, &entries).await?;
        }
        Ok(())
    }

    async fn load(path: &Path) -> Result<HashMap<String, PersistedEntry>, CacheError> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(path: &Path, entries: &HashMap<String, PersistedEntry>) -> Result<(), CacheError> {
        let data = serde_json::to_vec(entries)?;
        if let Err(e) = tokio::fs::write(path, &data).await {
            warn!("failed to persist {:?}: {}", path, e);
            return Err(e.into());
        }
        Ok(())
    }
}
