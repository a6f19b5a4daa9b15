use crate::membership::FilterStore;
use crate::types::{CollectorError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// [`FilterStore`] backed by a RedisBloom deployment, the shared
/// multi-tenant membership service production runs point at. Speaks the
/// three-command wire contract directly: BF.RESERVE / BF.ADD / BF.EXISTS.
///
/// The connection manager reconnects on its own; command failures during
/// an outage surface as `FilterUnavailable` through the membership layer.
pub struct RedisBloomStore {
    conn: ConnectionManager,
}

impl RedisBloomStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CollectorError::FilterUnavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CollectorError::FilterUnavailable(e.to_string()))?;
        info!(url, "connected to RedisBloom filter store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl FilterStore for RedisBloomStore {
    async fn reserve(&self, namespace: &str, error_rate: f64, capacity: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let reserved: redis::RedisResult<()> = redis::cmd("BF.RESERVE")
            .arg(namespace)
            .arg(error_rate)
            .arg(capacity)
            .query_async(&mut conn)
            .await;
        match reserved {
            Ok(()) => {
                debug!(namespace, capacity, error_rate, "reserved bloom filter");
                Ok(())
            }
            // "item exists": the namespace is already provisioned, which
            // the contract treats as success.
            Err(e) if e.to_string().contains("exists") => Ok(()),
            Err(e) => Err(CollectorError::FilterUnavailable(e.to_string())),
        }
    }

    async fn add(&self, namespace: &str, identifier: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let admitted: i64 = redis::cmd("BF.ADD")
            .arg(namespace)
            .arg(identifier)
            .query_async(&mut conn)
            .await
            .map_err(|e| CollectorError::FilterUnavailable(e.to_string()))?;
        Ok(admitted == 1)
    }

    async fn exists(&self, namespace: &str, identifier: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let present: i64 = redis::cmd("BF.EXISTS")
            .arg(namespace)
            .arg(identifier)
            .query_async(&mut conn)
            .await
            .map_err(|e| CollectorError::FilterUnavailable(e.to_string()))?;
        Ok(present == 1)
    }
}
