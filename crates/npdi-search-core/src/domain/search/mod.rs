//! Officer, unit and agency search
//!
//! This module contains:
//! - Query normalization into stable cache/dedup keys
//! - The request registry (supersession and duplicate collapsing)
//! - Per-category search clients and the in-memory indexed client
//! - The result aggregator (merge, de-duplicate, rank)
//! - The LRU cache of finished searches
//! - The orchestrator behind `search_all`
//! - Search lifecycle events

pub mod aggregator;
pub mod cache;
pub mod client;
pub mod entity;
pub mod event;
pub mod orchestrator;
pub mod query;
pub mod registry;

pub use aggregator::{MergeOutcome, ResultAggregator};
pub use cache::{CacheStats, SearchCache};
pub use client::{
    ChunkStream, EntitySearchClient, IndexedEntityClient, clients_for_records, match_score,
};
pub use entity::{
    AggregatedResult, CategoryFailure, CategoryResult, CategoryStatus, EntityCategory,
    ResultSnapshot, SearchRecord, SnapshotKind,
};
pub use event::{SearchEvent, SearchEventType};
pub use orchestrator::{SearchOrchestrator, SearchOrchestratorBuilder, SearchSubscription};
pub use query::{NormalizedQuery, normalize};
pub use registry::{RegistryStats, RequestRegistry, RequestStart, SearchRequest};
