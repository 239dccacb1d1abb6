//! Search entity and related types
//!
//! Defines the records, chunks and snapshots that flow from the category
//! clients through the aggregator to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::query::NormalizedQuery;

/// Categories of entities that can be searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Individual officers
    Officer,
    /// Units within an agency (precincts, divisions, squads)
    Unit,
    /// Law enforcement agencies
    Agency,
}

impl EntityCategory {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Officer => "officer",
            Self::Unit => "unit",
            Self::Agency => "agency",
        }
    }

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "officer" | "officers" => Some(Self::Officer),
            "unit" | "units" => Some(Self::Unit),
            "agency" | "agencies" => Some(Self::Agency),
            _ => None,
        }
    }

    /// Label shown next to results
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Officer => "Officer",
            Self::Unit => "Unit",
            Self::Agency => "Agency",
        }
    }

    /// Path segment of the entity's API resource
    pub fn resource_path(&self) -> &'static str {
        match self {
            Self::Officer => "officers",
            Self::Unit => "units",
            Self::Agency => "agencies",
        }
    }

    /// Get all categories in default precedence order
    pub fn all() -> Vec<Self> {
        vec![Self::Officer, Self::Unit, Self::Agency]
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single matched record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Identifier of the entity, unique within its category
    pub id: String,

    /// Category the record belongs to
    pub category: EntityCategory,

    /// Display label (officer full name, unit or agency name)
    pub label: String,

    /// Relevance score (higher is better)
    #[serde(default)]
    pub score: f64,

    /// Secondary line, e.g. "Hispanic Woman, Sergeant at the Springfield PD"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    /// Extra detail lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,

    /// Name of the primary source the record was cited from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When the primary source last updated the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Explicit link to the entity; derived from category and id when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl SearchRecord {
    /// Create a new record with a zero score
    pub fn new(category: EntityCategory, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            label: label.into(),
            score: 0.0,
            subtitle: None,
            details: Vec::new(),
            source: None,
            last_updated: None,
            href: None,
        }
    }

    /// Set the relevance score
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Set the subtitle
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Add a detail line
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Set the source name
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the last-updated timestamp
    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = Some(last_updated);
        self
    }

    /// Link to the entity resource
    pub fn link(&self) -> String {
        self.href.clone().unwrap_or_else(|| {
            format!("/api/v1/{}/{}", self.category.resource_path(), self.id)
        })
    }

    /// Identity used for de-duplication
    pub fn key(&self) -> (EntityCategory, &str) {
        (self.category, self.id.as_str())
    }
}

/// One incremental batch of records from a single category client
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryResult {
    pub category: EntityCategory,
    pub records: Vec<SearchRecord>,
}

impl CategoryResult {
    /// Create a chunk, stamping every record with the chunk's category
    pub fn new(category: EntityCategory, records: Vec<SearchRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut record| {
                record.category = category;
                record
            })
            .collect();
        Self { category, records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Progress of one category within a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CategoryStatus {
    /// Still streaming
    Pending,
    /// Client reported completion
    Completed,
    /// Client failed; its contribution is empty
    Failed(String),
    /// Stopped before completion (supersession or deadline)
    Cancelled,
}

impl CategoryStatus {
    /// Whether the category will contribute nothing further
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A category that failed during a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFailure {
    pub category: EntityCategory,
    pub reason: String,
}

/// Merged, de-duplicated and ranked results of one search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Query the results belong to
    pub query: NormalizedQuery,

    /// Sequence number of the request that produced the results
    pub sequence: u64,

    /// Ranked entries, truncated to the configured maximum
    pub entries: Vec<SearchRecord>,

    /// Unique matches before truncation
    pub total_matches: usize,

    /// Status of every dispatched category
    pub categories: BTreeMap<EntityCategory, CategoryStatus>,

    /// Categories that failed
    pub failures: Vec<CategoryFailure>,

    /// Finalization was forced by the overall deadline
    pub deadline_exceeded: bool,
}

impl AggregatedResult {
    /// An empty result for a query
    pub fn empty(query: NormalizedQuery) -> Self {
        Self {
            query,
            sequence: 0,
            entries: Vec::new(),
            total_matches: 0,
            categories: BTreeMap::new(),
            failures: Vec::new(),
            deadline_exceeded: false,
        }
    }

    /// Some categories are missing from the result
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() || self.deadline_exceeded
    }

    /// Every dispatched category reached a terminal status
    pub fn is_complete(&self) -> bool {
        self.categories.values().all(CategoryStatus::is_terminal)
    }

    /// Number of entries beyond the truncation limit
    pub fn overflow_count(&self) -> usize {
        self.total_matches.saturating_sub(self.entries.len())
    }

    /// Entries belonging to one category
    pub fn entries_for(&self, category: EntityCategory) -> impl Iterator<Item = &SearchRecord> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// Look up an entry by identity
    pub fn find(&self, category: EntityCategory, id: &str) -> Option<&SearchRecord> {
        self.entries
            .iter()
            .find(|e| e.category == category && e.id == id)
    }
}

/// What a snapshot represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Last finished result for the query, served from cache while revalidating
    Cached,
    /// Live result so far; more chunks may follow
    Progressive,
    /// Terminal result for the request
    Final,
    /// Empty query; displayed results should be cleared
    Cleared,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Progressive => "progressive",
            Self::Final => "final",
            Self::Cleared => "cleared",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A result set delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub kind: SnapshotKind,
    pub result: AggregatedResult,
}

impl ResultSnapshot {
    pub fn cached(result: AggregatedResult) -> Self {
        Self {
            kind: SnapshotKind::Cached,
            result,
        }
    }

    pub fn progressive(result: AggregatedResult) -> Self {
        Self {
            kind: SnapshotKind::Progressive,
            result,
        }
    }

    pub fn final_result(result: AggregatedResult) -> Self {
        Self {
            kind: SnapshotKind::Final,
            result,
        }
    }

    pub fn cleared(query: NormalizedQuery) -> Self {
        Self {
            kind: SnapshotKind::Cleared,
            result: AggregatedResult::empty(query),
        }
    }

    /// Cached or progressive results that may still be replaced
    pub fn is_provisional(&self) -> bool {
        matches!(self.kind, SnapshotKind::Cached | SnapshotKind::Progressive)
    }

    pub fn is_final(&self) -> bool {
        self.kind == SnapshotKind::Final
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::search::query::normalize;

    #[test]
    fn test_entity_category_conversion() {
        assert_eq!(EntityCategory::Officer.as_str(), "officer");
        assert_eq!(
            EntityCategory::from_str("Agencies"),
            Some(EntityCategory::Agency)
        );
        assert_eq!(EntityCategory::from_str("civilian"), None);
        assert_eq!(EntityCategory::Unit.resource_path(), "units");
    }

    #[test]
    fn test_record_link_defaults_to_resource_path() {
        let record = SearchRecord::new(EntityCategory::Agency, "a-17", "Springfield PD");
        assert_eq!(record.link(), "/api/v1/agencies/a-17");

        let mut linked = record.clone();
        linked.href = Some("https://example.org/a-17".to_string());
        assert_eq!(linked.link(), "https://example.org/a-17");
    }

    #[test]
    fn test_chunk_stamps_category() {
        let chunk = CategoryResult::new(
            EntityCategory::Unit,
            vec![SearchRecord::new(EntityCategory::Officer, "1", "Precinct 9")],
        );
        assert_eq!(chunk.records[0].category, EntityCategory::Unit);
    }

    #[test]
    fn test_aggregated_result_flags() {
        let mut result = AggregatedResult::empty(normalize("smith"));
        assert!(!result.is_partial());
        assert!(result.is_complete());

        result
            .categories
            .insert(EntityCategory::Officer, CategoryStatus::Pending);
        assert!(!result.is_complete());

        result.failures.push(CategoryFailure {
            category: EntityCategory::Unit,
            reason: "timeout".to_string(),
        });
        assert!(result.is_partial());
    }

    #[test]
    fn test_snapshot_serializes_category_map() {
        let mut result = AggregatedResult::empty(normalize("Smith"));
        result
            .categories
            .insert(EntityCategory::Unit, CategoryStatus::Failed("down".to_string()));
        let json = serde_json::to_value(ResultSnapshot::final_result(result)).unwrap();
        assert_eq!(json["kind"], "final");
        assert_eq!(json["result"]["categories"]["unit"]["status"], "failed");
        assert_eq!(json["result"]["categories"]["unit"]["reason"], "down");
    }
}
