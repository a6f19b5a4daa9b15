pub mod config;
pub mod controller;
pub mod fetcher;
pub mod identity;
pub mod membership;
pub mod parser;
pub mod redis_store;
pub mod registry;
pub mod sink;
pub mod sources;
pub mod types;

pub use controller::{IngestionCycleController, SourceRun};
pub use fetcher::Fetcher;
pub use membership::{FilterStore, MembershipFilter, MemoryFilterStore};
pub use redis_store::RedisBloomStore;
pub use registry::{FilterTuning, TopicFilterRegistry};
pub use sink::{JsonSnapshotSink, PersistenceSink};
pub use types::*;
