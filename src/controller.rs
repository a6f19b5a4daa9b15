use crate::identity;
use crate::membership::FilterNamespace;
use crate::registry::{FilterTuning, TopicFilterRegistry};
use crate::sink::PersistenceSink;
use crate::sources::ItemSource;
use crate::types::{CycleResult, Item, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Everything the controller needs to drive one source: its topics in
/// processing order, the item-source shape, and filter settings.
pub struct SourceRun {
    pub name: String,
    pub topics: Vec<String>,
    pub source: ItemSource,
    pub tuning: FilterTuning,
    pub normalize_links: bool,
}

struct TopicOutcome {
    admitted: Vec<Item>,
    duplicates: u64,
    stopped_early: bool,
}

/// Drives one ingestion run per source: routes every fetched item
/// through identity hashing and the membership filter, applies the
/// pagination stop policy, and aggregates the run's statistics.
///
/// Topics run sequentially with a pacing delay between fetches; that
/// delay is a politeness bound on the request rate to one publisher,
/// not a tunable for throughput. Separate sources may run this
/// controller concurrently since their filter namespaces are disjoint.
pub struct IngestionCycleController {
    registry: Arc<TopicFilterRegistry>,
    sink: Arc<dyn PersistenceSink>,
    pace: Duration,
    is_running: Arc<RwLock<bool>>,
}

impl IngestionCycleController {
    pub fn new(registry: Arc<TopicFilterRegistry>, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            registry,
            sink,
            pace: Duration::from_secs(1),
            is_running: Arc::new(RwLock::new(true)),
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Shared flag for run-level cancellation; flip to false on
    /// shutdown. Checked between topics and between pages, never
    /// mid-item.
    pub fn running_flag(&self) -> Arc<RwLock<bool>> {
        self.is_running.clone()
    }

    async fn cancelled(&self) -> bool {
        !*self.is_running.read().await
    }

    /// Run one full cycle for a source. One topic's failure never aborts
    /// the run; it is logged and the topic lands in the empty list.
    pub async fn run_source(&self, run: &SourceRun) -> CycleResult {
        let mut result = CycleResult::new(&run.name);
        info!(source = %run.name, topics = run.topics.len(), "starting ingestion cycle");

        for (index, topic) in run.topics.iter().enumerate() {
            if self.cancelled().await {
                warn!(source = %run.name, "run cancelled, stopping before topic {topic}");
                break;
            }
            if index > 0 && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }

            match self.run_topic(run, topic).await {
                Ok(outcome) => {
                    if outcome.stopped_early {
                        result.stopped_early.push(topic.clone());
                    }
                    result.record_topic(topic, outcome.admitted.len(), outcome.duplicates);
                }
                Err(e) => {
                    error!(source = %run.name, topic = %topic, "topic failed: {e}");
                    result.empty.push(topic.clone());
                }
            }
        }

        result.log_summary();
        result
    }

    async fn run_topic(&self, run: &SourceRun, topic: &str) -> Result<TopicOutcome> {
        let ns = self
            .registry
            .get_or_create(&run.name, topic, run.tuning)
            .await?;

        let outcome = match &run.source {
            ItemSource::Feed(source) => {
                let items = source.fetch(topic).await?;
                let (admitted, duplicates) = self.filter_items(&ns, run, items).await?;
                TopicOutcome {
                    admitted,
                    duplicates,
                    stopped_early: false,
                }
            }
            ItemSource::Paginated { source, max_pages } => {
                self.run_paginated_topic(run, topic, &ns, source.as_ref(), *max_pages)
                    .await?
            }
        };

        // Never overwrite a prior snapshot with an empty file.
        if !outcome.admitted.is_empty() {
            self.sink.store(&run.name, topic, &outcome.admitted).await?;
        }
        Ok(outcome)
    }

    async fn run_paginated_topic(
        &self,
        run: &SourceRun,
        topic: &str,
        ns: &FilterNamespace,
        source: &dyn crate::sources::PageSource,
        max_pages: u32,
    ) -> Result<TopicOutcome> {
        let mut admitted = Vec::new();
        let mut duplicates = 0u64;
        let mut stopped_early = false;

        for page in 1..=max_pages {
            if self.cancelled().await {
                warn!(source = %run.name, topic, page, "run cancelled mid-pagination");
                break;
            }

            let fetched = match source.fetch_page(topic, page).await {
                Ok(fetched) => fetched,
                // A failed page ends pagination; it is end-of-data for
                // this cycle, not a topic failure.
                Err(e) => {
                    warn!(source = %run.name, topic, page, "page fetch failed, stopping: {e}");
                    break;
                }
            };
            if fetched.items.is_empty() {
                debug!(source = %run.name, topic, page, "empty page, stopping");
                break;
            }

            let (page_admitted, page_duplicates) =
                self.filter_items(ns, run, fetched.items).await?;
            admitted.extend(page_admitted);
            duplicates += page_duplicates;

            // Pages are assumed newest-first, so one seen item means the
            // remaining pages are history we already hold. Finish this
            // page, then stop.
            if page_duplicates > 0 {
                debug!(source = %run.name, topic, page, "duplicate seen, stopping pagination");
                stopped_early = true;
                break;
            }
            if !fetched.has_more {
                break;
            }
        }

        Ok(TopicOutcome {
            admitted,
            duplicates,
            stopped_early,
        })
    }

    /// Route items through identity + membership in source order.
    /// Admitted items keep that order and carry their identifier;
    /// rejections are counted, incomplete natural keys are skipped
    /// without counting.
    async fn filter_items(
        &self,
        ns: &FilterNamespace,
        run: &SourceRun,
        items: Vec<Item>,
    ) -> Result<(Vec<Item>, u64)> {
        let mut admitted = Vec::new();
        let mut duplicates = 0u64;

        for mut item in items {
            if !item.has_natural_key() {
                debug!(source = %run.name, topic = %item.topic, "skipping item with incomplete natural key");
                continue;
            }

            let link = if run.normalize_links {
                identity::normalize_link(&item.link)
            } else {
                item.link.clone()
            };
            let identifier = identity::identify([link.as_str(), item.title.as_str()]);

            if self.registry.filter().try_admit(ns, &identifier).await? {
                item.id = Some(identifier);
                admitted.push(item);
            } else {
                duplicates += 1;
            }
        }

        Ok((admitted, duplicates))
    }
}
