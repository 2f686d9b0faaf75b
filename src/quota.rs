use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{PersistedEntry, PersistentStore};
use crate::config::QuotaConfig;

const USAGE_NAMESPACE: &str = "api_usage";
const USAGE_KEY: &str = "youtube";

/// One day's consumed API units. Reset lazily when the wall-clock day rolls
/// over; mutated only through [`QuotaTracker::increment`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaUsage {
    pub day: NaiveDate,
    pub units_consumed: u64,
    pub last_updated: DateTime<Utc>,
}

impl QuotaUsage {
    fn today() -> Self {
        Self {
            day: Utc::now().date_naive(),
            units_consumed: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Advisory per-day counter of consumed quota units. Never blocks and never
/// fails an operation by itself; callers decide what to do near the limit.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    state: Arc<Mutex<QuotaUsage>>,
    daily_limit: u64,
    warn_fraction: f64,
    mirror: Option<Arc<PersistentStore>>,
}

impl QuotaTracker {
    pub fn new(config: &QuotaConfig, mirror: Option<Arc<PersistentStore>>) -> Self {
        debug!(
            "initializing quota tracker, daily limit {} (warn at {:.0}%)",
            config.daily_limit,
            config.warn_fraction * 100.0
        );
        Self {
            state: Arc::new(Mutex::new(QuotaUsage::today())),
            daily_limit: config.daily_limit,
            warn_fraction: config.warn_fraction,
            mirror,
        }
    }

    /// Reload today's counter from the persistent mirror, if present. A
    /// record from an earlier day is discarded.
    pub async fn restore(&self) {
        let Some(mirror) = &self.mirror else { return };
        let persisted = match mirror.read_entry(USAGE_NAMESPACE, USAGE_KEY).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                warn!("failed to restore quota usage: {}", e);
                return;
            }
        };
        let Ok(usage) = serde_json::from_value::<QuotaUsage>(persisted.value) else {
            warn!("persisted quota usage is unreadable, starting fresh");
            return;
        };
        if usage.day == Utc::now().date_naive() {
            info!(
                "restored quota usage: {} units consumed today",
                usage.units_consumed
            );
            *self.state.lock().await = usage;
        }
    }

    /// Today's counter, initialized at zero when the stored day is stale.
    pub async fn current_usage(&self) -> QuotaUsage {
        let mut state = self.state.lock().await;
        if state.day != Utc::now().date_naive() {
            debug!("quota day rolled over, resetting counter");
            *state = QuotaUsage::today();
        }
        state.clone()
    }

    /// Add `units` to today's counter and persist the updated record.
    pub async fn increment(&self, units: u64) -> QuotaUsage {
        let updated = {
            let mut state = self.state.lock().await;
            if state.day != Utc::now().date_naive() {
                *state = QuotaUsage::today();
            }
            state.units_consumed += units;
            state.last_updated = Utc::now();
            state.clone()
        };

        if let Some(mirror) = &self.mirror {
            match serde_json::to_value(&updated) {
                Ok(json) => {
                    let entry = PersistedEntry {
                        value: json,
                        timestamp: updated.last_updated,
                    };
                    if let Err(e) = mirror.write_entry(USAGE_NAMESPACE, USAGE_KEY, entry).await {
                        warn!("failed to persist quota usage: {}", e);
                    }
                }
                Err(e) => warn!("failed to serialize quota usage: {}", e),
            }
        }

        debug!(
            "quota usage now {}/{} units",
            updated.units_consumed, self.daily_limit
        );
        updated
    }

    /// True once consumption passes the warn fraction of the daily ceiling.
    pub async fn is_approaching_limit(&self) -> bool {
        let usage = self.current_usage().await;
        let threshold = (self.daily_limit as f64 * self.warn_fraction) as u64;
        usage.units_consumed > threshold
    }
}
