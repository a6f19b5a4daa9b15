use crate::membership::{FilterNamespace, FilterStore, MembershipFilter};
use crate::types::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEFAULT_KEY_PREFIX: &str = "rss_seen";
pub const DEFAULT_CAPACITY: usize = 100_000;
pub const DEFAULT_ERROR_RATE: f64 = 0.001;

/// Filter tuning fixed per source, not per call.
#[derive(Debug, Clone, Copy)]
pub struct FilterTuning {
    pub capacity: usize,
    pub error_rate: f64,
}

impl Default for FilterTuning {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            error_rate: DEFAULT_ERROR_RATE,
        }
    }
}

/// Maps a (source, topic) pair to an isolated filter namespace, lazily
/// provisioning the backing filter on first resolution. Safe to call
/// every cycle; the same pair always resolves to the same key for the
/// lifetime of the process, and the tuning recorded at first
/// provisioning is the one every later resolution reports.
pub struct TopicFilterRegistry {
    filter: MembershipFilter,
    prefix: String,
    provisioned: RwLock<HashMap<String, FilterTuning>>,
}

impl TopicFilterRegistry {
    pub fn new(store: Arc<dyn FilterStore>, prefix: impl Into<String>) -> Self {
        Self {
            filter: MembershipFilter::new(store),
            prefix: prefix.into(),
            provisioned: RwLock::new(HashMap::new()),
        }
    }

    pub fn filter(&self) -> &MembershipFilter {
        &self.filter
    }

    pub async fn get_or_create(
        &self,
        source: &str,
        topic: &str,
        tuning: FilterTuning,
    ) -> Result<FilterNamespace> {
        let key = format!("{}:{}:{}", self.prefix, source, topic);

        {
            let provisioned = self.provisioned.read().await;
            if let Some(recorded) = provisioned.get(&key) {
                if recorded.capacity != tuning.capacity
                    || recorded.error_rate != tuning.error_rate
                {
                    warn!(
                        namespace = %key,
                        "tuning changed after provisioning, keeping recorded values"
                    );
                }
                return Ok(FilterNamespace {
                    key,
                    capacity: recorded.capacity,
                    error_rate: recorded.error_rate,
                });
            }
        }

        let ns = FilterNamespace {
            key: key.clone(),
            capacity: tuning.capacity,
            error_rate: tuning.error_rate,
        };
        self.filter.ensure(&ns).await?;
        info!(namespace = %ns.key, capacity = ns.capacity, "provisioned filter namespace");
        self.provisioned.write().await.insert(key, tuning);
        Ok(ns)
    }
}
