//! Per-category search clients
//!
//! Every category is served by one [`EntitySearchClient`]. A client returns a
//! lazy stream of result chunks and stops producing as soon as its
//! cancellation token fires.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::entity::{CategoryResult, EntityCategory, SearchRecord};
use super::query::NormalizedQuery;
use crate::config::IndexSettings;
use crate::error::Result;

/// Lazy stream of chunks produced by one client for one query
pub type ChunkStream = BoxStream<'static, Result<CategoryResult>>;

/// Search capability for one entity category.
///
/// Streams may yield zero or more chunks. A failure is reported as an `Err`
/// item (normally [`Error::CategoryUnavailable`](crate::Error::CategoryUnavailable))
/// and only degrades the client's own category.
pub trait EntitySearchClient: Send + Sync {
    /// Category served by this client
    fn category(&self) -> EntityCategory;

    /// Start searching for `query`
    fn search(&self, query: &NormalizedQuery, cancel: CancellationToken) -> ChunkStream;
}

/// In-memory token-matching client over a fixed set of records
#[derive(Debug, Clone)]
pub struct IndexedEntityClient {
    category: EntityCategory,
    records: Arc<Vec<SearchRecord>>,
    chunk_size: usize,
    latency: Duration,
}

impl IndexedEntityClient {
    /// Build a client over `records`; records of other categories are ignored
    pub fn new(category: EntityCategory, records: Vec<SearchRecord>) -> Self {
        let records = records
            .into_iter()
            .filter(|r| r.category == category)
            .collect();
        Self {
            category,
            records: Arc::new(records),
            chunk_size: IndexSettings::default().chunk_size,
            latency: Duration::ZERO,
        }
    }

    /// Records per chunk (at least one)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delay before each chunk
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Apply index settings
    pub fn with_settings(self, settings: &IndexSettings) -> Self {
        self.with_chunk_size(settings.chunk_size)
            .with_latency(settings.latency())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Score and rank every record against the query
    fn rank(records: &[SearchRecord], query: &NormalizedQuery) -> Vec<SearchRecord> {
        let mut matches: Vec<SearchRecord> = records
            .iter()
            .filter_map(|record| {
                let score = match_score(&record.label, query);
                (score > 0.0).then(|| record.clone().with_score(score))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }
}

impl EntitySearchClient for IndexedEntityClient {
    fn category(&self) -> EntityCategory {
        self.category
    }

    fn search(&self, query: &NormalizedQuery, cancel: CancellationToken) -> ChunkStream {
        let category = self.category;
        let records = Arc::clone(&self.records);
        let chunk_size = self.chunk_size;
        let latency = self.latency;
        let query = query.clone();

        let stream = async_stream::stream! {
            let matches = IndexedEntityClient::rank(&records, &query);
            debug!(
                category = %category,
                query = %query,
                matches = matches.len(),
                "Index lookup finished"
            );

            for chunk in matches.chunks(chunk_size) {
                if !latency.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(latency) => {}
                    }
                }
                if cancel.is_cancelled() {
                    break;
                }
                yield Ok(CategoryResult::new(category, chunk.to_vec()));
            }
        };

        stream.boxed()
    }
}

/// Relevance of `label` for `query`.
///
/// Each query token scores 1.0 for an exact label token, 0.5 for a label
/// token it prefixes and 0.0 otherwise; the result is the mean over query
/// tokens.
pub fn match_score(label: &str, query: &NormalizedQuery) -> f64 {
    let label = label.to_lowercase();
    let label_tokens: Vec<&str> = label
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .collect();

    let mut total = 0.0;
    let mut count = 0usize;
    for token in query.tokens() {
        count += 1;
        if label_tokens.iter().any(|t| *t == token) {
            total += 1.0;
        } else if label_tokens.iter().any(|t| t.starts_with(token)) {
            total += 0.5;
        }
    }

    if count == 0 { 0.0 } else { total / count as f64 }
}

/// One indexed client per category, built from a mixed record set
pub fn clients_for_records(
    records: &[SearchRecord],
    settings: &IndexSettings,
) -> Vec<Arc<dyn EntitySearchClient>> {
    EntityCategory::all()
        .into_iter()
        .map(|category| {
            let client = IndexedEntityClient::new(category, records.to_vec()).with_settings(settings);
            Arc::new(client) as Arc<dyn EntitySearchClient>
        })
        .collect()
}
