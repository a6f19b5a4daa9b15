use crate::registry::{FilterTuning, DEFAULT_CAPACITY, DEFAULT_ERROR_RATE, DEFAULT_KEY_PREFIX};
use crate::types::{CollectorError, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

fn default_interval() -> u64 {
    3600
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_error_rate() -> f64 {
    DEFAULT_ERROR_RATE
}

fn default_max_pages() -> u32 {
    5
}

/// Top-level collector configuration, loaded from a JSON file. Sources
/// and topics are arrays so their configured order is the processing
/// order.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    pub sources: Vec<SourceConfig>,
}

impl CollectorConfig {
    /// Load and parse the config file. A failure here is fatal to the
    /// run; it is the only error class that is.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: CollectorConfig = serde_json::from_str(&body).map_err(|e| {
            CollectorError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        if config.sources.is_empty() {
            return Err(CollectorError::Config("no sources configured".to_string()));
        }
        Ok(config)
    }
}

/// One publisher. The mode tag picks the item-source shape; everything
/// else that varies between publishers is data here.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    #[serde(default)]
    pub normalize_links: bool,
    #[serde(flatten)]
    pub mode: SourceMode,
}

impl SourceConfig {
    pub fn tuning(&self) -> FilterTuning {
        FilterTuning {
            capacity: self.capacity,
            error_rate: self.error_rate,
        }
    }

    /// Topic names in configured order.
    pub fn topic_names(&self) -> Vec<String> {
        match &self.mode {
            SourceMode::Feed { topics } => topics.iter().map(|t| t.name.clone()).collect(),
            SourceMode::Paginated { topics, .. } => {
                topics.iter().map(|t| t.name.clone()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SourceMode {
    Feed {
        topics: Vec<FeedTopic>,
    },
    Paginated {
        base_url: String,
        topics: Vec<ApiTopic>,
        #[serde(default = "default_max_pages")]
        max_pages: u32,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedTopic {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTopic {
    pub name: String,
    pub id: u64,
}

pub fn redis_url_from_env() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_source_modes_with_defaults() {
        let body = r#"{
            "sources": [
                {
                    "name": "cnbc",
                    "mode": "feed",
                    "topics": [
                        { "name": "main", "url": "https://example.com/rss" },
                        { "name": "tech", "url": "https://example.com/tech.rss" }
                    ]
                },
                {
                    "name": "mit_tech",
                    "mode": "paginated",
                    "base_url": "https://example.com/topic_feed",
                    "capacity": 50000,
                    "normalize_links": true,
                    "topics": [
                        { "name": "business", "id": 19088 },
                        { "name": "climate-change", "id": 21 }
                    ]
                }
            ]
        }"#;

        let config: CollectorConfig = serde_json::from_str(body).unwrap();
        assert_eq!(config.interval_secs, 3600);
        assert_eq!(config.key_prefix, "rss_seen");
        assert_eq!(config.sources.len(), 2);

        let cnbc = &config.sources[0];
        assert_eq!(cnbc.capacity, 100_000);
        assert!((cnbc.error_rate - 0.001).abs() < f64::EPSILON);
        assert!(!cnbc.normalize_links);
        assert_eq!(cnbc.topic_names(), vec!["main", "tech"]);

        let mit = &config.sources[1];
        assert_eq!(mit.capacity, 50_000);
        assert!(mit.normalize_links);
        match &mit.mode {
            SourceMode::Paginated { max_pages, topics, .. } => {
                assert_eq!(*max_pages, 5);
                assert_eq!(topics[0].id, 19088);
            }
            _ => panic!("expected paginated mode"),
        }
    }

    #[test]
    fn rejects_empty_source_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.json");
        std::fs::write(&path, r#"{ "sources": [] }"#).unwrap();
        assert!(CollectorConfig::load(&path).is_err());
    }
}
