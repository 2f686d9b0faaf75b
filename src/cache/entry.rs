use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single cached value with its write timestamp. Immutable once written;
/// a new write for the same key replaces the whole entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Utc::now(),
        }
    }

    pub fn with_timestamp(value: T, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.stored_at
    }

    pub fn is_valid(&self, max_age: Duration) -> bool {
        self.age() <= max_age
    }
}
