use crate::types::{Item, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

/// Durable storage for a topic's admitted items. `store` overwrites any
/// prior snapshot for the (source, topic) key; it is not an append log.
/// Callers skip the call for empty lists, but implementations tolerate
/// them as a no-op.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn store(&self, source: &str, topic: &str, items: &[Item]) -> Result<()>;
}

/// Writes one pretty-printed JSON snapshot per (source, topic) under
/// `{root}/{source}/{topic}.json`.
pub struct JsonSnapshotSink {
    root: PathBuf,
}

impl JsonSnapshotSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn snapshot_path(&self, source: &str, topic: &str) -> PathBuf {
        self.root.join(source).join(format!("{topic}.json"))
    }
}

#[async_trait]
impl PersistenceSink for JsonSnapshotSink {
    async fn store(&self, source: &str, topic: &str, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            debug!(source, topic, "skipping empty snapshot");
            return Ok(());
        }

        let path = self.snapshot_path(source, topic);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&path, body).await?;
        info!(source, topic, count = items.len(), path = %path.display(), "wrote snapshot");
        Ok(())
    }
}
