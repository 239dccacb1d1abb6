//! npdi-search Core Library
//!
//! This crate provides the search orchestration behind the "Search officer,
//! unit, or agency" bar, including:
//! - Query normalization into stable cache/dedup keys
//! - Request supersession and duplicate collapsing
//! - Per-category search clients with cooperative cancellation
//! - Progressive merging of category results into one ranked list
//! - An LRU cache of finished searches (cache-then-revalidate)
//! - Search lifecycle events
//! - File-backed configuration

pub mod config;
pub mod domain;
pub mod error;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, IndexSettings, SearchSettings};
    pub use crate::domain::search::{
        AggregatedResult, EntityCategory, EntitySearchClient, IndexedEntityClient,
        NormalizedQuery, RequestRegistry, ResultSnapshot, SearchCache, SearchOrchestrator,
        SearchRecord, SearchSubscription, SnapshotKind, normalize,
    };
    pub use crate::error::{Error, Result};
}
