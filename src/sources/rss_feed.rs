use super::FeedSource;
use crate::fetcher::Fetcher;
use crate::parser;
use crate::types::{CollectorError, Item, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// RSS/Atom item source: each topic maps to one feed URL fetched in a
/// single request.
pub struct RssFeedSource {
    fetcher: Arc<Fetcher>,
    feeds: HashMap<String, String>,
}

impl RssFeedSource {
    pub fn new(fetcher: Arc<Fetcher>, feeds: HashMap<String, String>) -> Self {
        Self { fetcher, feeds }
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch(&self, topic: &str) -> Result<Vec<Item>> {
        let url = self
            .feeds
            .get(topic)
            .ok_or_else(|| CollectorError::Config(format!("no feed URL for topic {topic}")))?;

        let body = self.fetcher.fetch_text(url).await?;
        let items = parser::parse_feed(&body, topic)?;
        info!(topic, url, count = items.len(), "fetched feed");
        Ok(items)
    }
}
