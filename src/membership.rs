use crate::types::{CollectorError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Wire contract of the shared membership service. Three operations,
/// matching an approximate-membership filter per namespace:
/// idempotent provisioning, atomic test-and-set, and a read-only probe.
///
/// Injected everywhere (never a module-level singleton) so tests can
/// substitute [`MemoryFilterStore`] for the Redis-backed store.
#[async_trait]
pub trait FilterStore: Send + Sync {
    /// Provision the namespace's filter if absent. Not an error when the
    /// namespace is already reserved.
    async fn reserve(&self, namespace: &str, error_rate: f64, capacity: usize) -> Result<()>;

    /// Atomically test-and-set membership. `Ok(true)` means the
    /// identifier was not previously recorded and this call recorded it;
    /// `Ok(false)` means it was already present.
    async fn add(&self, namespace: &str, identifier: &str) -> Result<bool>;

    /// Read-only membership probe. Diagnostics only, never used on the
    /// ingestion path.
    async fn exists(&self, namespace: &str, identifier: &str) -> Result<bool>;
}

/// An isolated membership scope for one (source, topic) pair, carrying
/// the tuning the namespace was provisioned with.
#[derive(Debug, Clone)]
pub struct FilterNamespace {
    pub key: String,
    pub capacity: usize,
    pub error_rate: f64,
}

/// Namespaced, persistent, probabilistic set: "has an identifier with
/// this key been admitted before?"
///
/// False positives are intrinsic (a genuinely new item may be rejected,
/// at roughly the configured error rate); false negatives do not occur,
/// which is what makes `try_admit` an at-most-one-admission guarantee.
pub struct MembershipFilter {
    store: std::sync::Arc<dyn FilterStore>,
}

impl MembershipFilter {
    pub fn new(store: std::sync::Arc<dyn FilterStore>) -> Self {
        Self { store }
    }

    pub async fn ensure(&self, ns: &FilterNamespace) -> Result<()> {
        self.store
            .reserve(&ns.key, ns.error_rate, ns.capacity)
            .await
    }

    /// Test-and-set the identifier against the namespace.
    ///
    /// On a store failure the namespace is lazily re-provisioned once and
    /// the add retried; if that also fails the error is surfaced as
    /// [`CollectorError::FilterUnavailable`] so the caller fails the
    /// topic instead of guessing admit or reject.
    pub async fn try_admit(&self, ns: &FilterNamespace, identifier: &str) -> Result<bool> {
        match self.store.add(&ns.key, identifier).await {
            Ok(admitted) => Ok(admitted),
            Err(first) => {
                warn!(namespace = %ns.key, "filter add failed, re-provisioning and retrying: {first}");
                self.store
                    .reserve(&ns.key, ns.error_rate, ns.capacity)
                    .await
                    .map_err(|e| CollectorError::FilterUnavailable(e.to_string()))?;
                self.store
                    .add(&ns.key, identifier)
                    .await
                    .map_err(|e| CollectorError::FilterUnavailable(e.to_string()))
            }
        }
    }

    pub async fn exists(&self, ns: &FilterNamespace, identifier: &str) -> Result<bool> {
        self.store.exists(&ns.key, identifier).await
    }
}

/// One in-memory Bloom filter: a bit array with `k` probe positions per
/// value, derived from the SHA-256 digest by double hashing.
struct BloomSlab {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomSlab {
    fn new(capacity: usize, error_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        // Standard Bloom sizing for the requested capacity/error pair.
        let num_bits = ((-n * error_rate.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;
        let words = num_bits.div_ceil(64) as usize;
        Self {
            bits: vec![0u64; words],
            num_bits,
            num_hashes,
        }
    }

    fn positions(&self, value: &str) -> impl Iterator<Item = u64> + '_ {
        let digest = Sha256::digest(value.as_bytes());
        let h1 = u64::from_be_bytes(digest[0..8].try_into().unwrap());
        // Odd increment so successive probes cover the array.
        let h2 = u64::from_be_bytes(digest[8..16].try_into().unwrap()) | 1;
        let num_bits = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }

    fn contains(&self, value: &str) -> bool {
        self.positions(value)
            .all(|pos| self.bits[(pos / 64) as usize] & (1 << (pos % 64)) != 0)
    }

    /// Test-and-set in one pass. Returns true when at least one bit was
    /// newly set (the value was not previously recorded).
    fn insert(&mut self, value: &str) -> bool {
        let positions: Vec<u64> = self.positions(value).collect();
        let mut newly_set = false;
        for pos in positions {
            let word = (pos / 64) as usize;
            let mask = 1u64 << (pos % 64);
            if self.bits[word] & mask == 0 {
                self.bits[word] |= mask;
                newly_set = true;
            }
        }
        newly_set
    }
}

/// In-process [`FilterStore`]: one Bloom filter per reserved namespace
/// behind a single write lock, which makes `add` a single logical
/// test-and-set. State lives only for the process lifetime; production
/// runs use the Redis-backed store instead.
#[derive(Default)]
pub struct MemoryFilterStore {
    slabs: RwLock<HashMap<String, BloomSlab>>,
}

impl MemoryFilterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilterStore for MemoryFilterStore {
    async fn reserve(&self, namespace: &str, error_rate: f64, capacity: usize) -> Result<()> {
        let mut slabs = self.slabs.write().await;
        if !slabs.contains_key(namespace) {
            debug!(namespace, capacity, error_rate, "reserving in-memory filter");
            slabs.insert(namespace.to_string(), BloomSlab::new(capacity, error_rate));
        }
        Ok(())
    }

    async fn add(&self, namespace: &str, identifier: &str) -> Result<bool> {
        let mut slabs = self.slabs.write().await;
        let slab = slabs.get_mut(namespace).ok_or_else(|| {
            CollectorError::FilterUnavailable(format!("namespace {namespace} not reserved"))
        })?;
        Ok(slab.insert(identifier))
    }

    async fn exists(&self, namespace: &str, identifier: &str) -> Result<bool> {
        let slabs = self.slabs.read().await;
        let slab = slabs.get(namespace).ok_or_else(|| {
            CollectorError::FilterUnavailable(format!("namespace {namespace} not reserved"))
        })?;
        Ok(slab.contains(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ns(key: &str) -> FilterNamespace {
        FilterNamespace {
            key: key.to_string(),
            capacity: 1000,
            error_rate: 0.001,
        }
    }

    #[tokio::test]
    async fn add_is_test_and_set() {
        let store = MemoryFilterStore::new();
        store.reserve("t", 0.001, 1000).await.unwrap();
        assert!(store.add("t", "a").await.unwrap());
        assert!(!store.add("t", "a").await.unwrap());
        assert!(store.add("t", "b").await.unwrap());
        assert!(!store.add("t", "a").await.unwrap());
    }

    #[tokio::test]
    async fn no_false_negatives() {
        let store = MemoryFilterStore::new();
        store.reserve("t", 0.01, 2000).await.unwrap();
        for i in 0..1000 {
            store.add("t", &format!("id-{i}")).await.unwrap();
        }
        for i in 0..1000 {
            assert!(
                store.exists("t", &format!("id-{i}")).await.unwrap(),
                "previously admitted identifier must still be present"
            );
            assert!(!store.add("t", &format!("id-{i}")).await.unwrap());
        }
    }

    #[tokio::test]
    async fn reserve_is_idempotent() {
        let store = MemoryFilterStore::new();
        store.reserve("t", 0.001, 1000).await.unwrap();
        store.add("t", "a").await.unwrap();
        // A second reserve must not wipe recorded membership.
        store.reserve("t", 0.001, 1000).await.unwrap();
        assert!(store.exists("t", "a").await.unwrap());
    }

    #[tokio::test]
    async fn try_admit_reprovisions_unreserved_namespace() {
        let filter = MembershipFilter::new(Arc::new(MemoryFilterStore::new()));
        let ns = ns("lazy");
        // No explicit ensure: the first add fails inside the store and
        // the filter reserves then retries.
        assert!(filter.try_admit(&ns, "a").await.unwrap());
        assert!(!filter.try_admit(&ns, "a").await.unwrap());
    }

    #[tokio::test]
    async fn exists_does_not_record() {
        let filter = MembershipFilter::new(Arc::new(MemoryFilterStore::new()));
        let ns = ns("probe");
        filter.ensure(&ns).await.unwrap();
        assert!(!filter.exists(&ns, "a").await.unwrap());
        assert!(filter.try_admit(&ns, "a").await.unwrap());
        assert!(filter.exists(&ns, "a").await.unwrap());
    }
}
