pub mod rss_feed;
pub mod topic_api;

use crate::types::{Item, Page, Result};
use async_trait::async_trait;

pub use rss_feed::RssFeedSource;
pub use topic_api::TopicApiSource;

/// Simple feed source: one fetch returns the full item list for a topic,
/// in publication order. An empty feed is an empty vec, not an error;
/// errors mean genuine transport failure.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, topic: &str) -> Result<Vec<Item>>;
}

/// Paginated source: one request per page. An empty page signals
/// end-of-data.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, topic: &str, page: u32) -> Result<Page>;
}

/// The two item-source shapes the controller drives. Per-publisher
/// variation lives in configuration, not in per-source control flow.
pub enum ItemSource {
    Feed(Box<dyn FeedSource>),
    Paginated {
        source: Box<dyn PageSource>,
        max_pages: u32,
    },
}
