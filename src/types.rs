use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One unit of content produced by an item source.
///
/// `link` and `title` form the natural key that seeds the content
/// identifier; everything else is source-specific payload carried into
/// the snapshot. `id` is attached by the controller when the item is
/// admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub topic: String,
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl Item {
    pub fn new(topic: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            title: title.into(),
            link: link.into(),
            summary: None,
            content: None,
            published: None,
            author: None,
            categories: Vec::new(),
            image: None,
            collected_at: Utc::now(),
        }
    }

    /// An item missing either link or title cannot be identified and is
    /// skipped by the controller.
    pub fn has_natural_key(&self) -> bool {
        !self.title.is_empty() && !self.link.is_empty()
    }
}

/// One page of a paginated source.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub admitted: usize,
}

/// Per-source run aggregate. Owned by the controller for the duration of
/// one run; logged at the end, not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub success: Vec<TopicCount>,
    pub empty: Vec<String>,
    pub duplicates: HashMap<String, u64>,
    pub stopped_early: Vec<String>,
}

impl CycleResult {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            started_at: Utc::now(),
            success: Vec::new(),
            empty: Vec::new(),
            duplicates: HashMap::new(),
            stopped_early: Vec::new(),
        }
    }

    pub fn record_topic(&mut self, topic: &str, admitted: usize, duplicates: u64) {
        self.duplicates.insert(topic.to_string(), duplicates);
        if admitted > 0 {
            self.success.push(TopicCount {
                topic: topic.to_string(),
                admitted,
            });
        } else {
            self.empty.push(topic.to_string());
        }
    }

    pub fn total_admitted(&self) -> usize {
        self.success.iter().map(|t| t.admitted).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.duplicates.values().sum()
    }

    pub fn log_summary(&self) {
        let success: Vec<String> = self
            .success
            .iter()
            .map(|t| format!("{}({})", t.topic, t.admitted))
            .collect();
        tracing::info!(
            source = %self.source,
            success = %success.join(", "),
            empty = %self.empty.join(", "),
            "cycle completed: {} admitted, {} duplicates, {} empty topics",
            self.total_admitted(),
            self.total_duplicates(),
            self.empty.len()
        );
        for (topic, count) in &self.duplicates {
            if *count > 0 {
                tracing::debug!(source = %self.source, topic = %topic, "{} duplicates rejected", count);
            }
        }
    }
}

/// HTTP fetch settings shared by all sources.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "feed-collector/0.1".to_string(),
            timeout_seconds: 10,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    /// The membership backing store could not answer even after one
    /// re-provisioning retry. Never conflated with a duplicate: guessing
    /// either way would corrupt statistics or drop new content.
    #[error("filter store unavailable: {0}")]
    FilterUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
