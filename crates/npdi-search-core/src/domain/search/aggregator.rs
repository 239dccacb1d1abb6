//! Result aggregation
//!
//! Merges chunks from every category into one ranked, de-duplicated list and
//! tracks per-category completion. One aggregator belongs to exactly one
//! request; the request's driver owns it, so merges never race.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::entity::{
    AggregatedResult, CategoryFailure, CategoryResult, CategoryStatus, EntityCategory,
    SearchRecord,
};
use super::query::NormalizedQuery;
use crate::config::SearchSettings;

/// Result of merging one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The chunk was applied; `changed` is false when it added nothing new
    Merged { changed: bool },
    /// The chunk belongs to an older request and was dropped
    Stale,
    /// The category is unknown or already terminal
    Ignored,
}

/// Accumulates the results of one search request
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    query: NormalizedQuery,
    sequence: u64,
    precedence: Vec<EntityCategory>,
    max_results: usize,
    records: HashMap<(EntityCategory, String), SearchRecord>,
    statuses: BTreeMap<EntityCategory, CategoryStatus>,
    failures: Vec<CategoryFailure>,
    deadline_exceeded: bool,
}

impl ResultAggregator {
    /// Create an aggregator expecting results from `categories`
    pub fn new(
        query: NormalizedQuery,
        sequence: u64,
        categories: impl IntoIterator<Item = EntityCategory>,
        settings: &SearchSettings,
    ) -> Self {
        let statuses = categories
            .into_iter()
            .map(|c| (c, CategoryStatus::Pending))
            .collect();

        Self {
            query,
            sequence,
            precedence: settings.category_precedence.clone(),
            max_results: settings.max_results,
            records: HashMap::new(),
            statuses,
            failures: Vec::new(),
            deadline_exceeded: false,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Merge a chunk tagged with `sequence`.
    ///
    /// Chunks whose sequence is not `current_sequence` are stale and dropped.
    /// Within a category a record with the same id keeps the higher score;
    /// on equal scores the first arrival stays.
    pub fn merge(
        &mut self,
        chunk: CategoryResult,
        sequence: u64,
        current_sequence: u64,
    ) -> MergeOutcome {
        if sequence != current_sequence {
            return MergeOutcome::Stale;
        }

        let category = chunk.category;
        match self.statuses.get(&category) {
            Some(CategoryStatus::Pending) => {}
            _ => return MergeOutcome::Ignored,
        }

        let mut changed = false;
        for mut record in chunk.records {
            record.category = category;
            let key = (category, record.id.clone());
            let keep_existing = self
                .records
                .get(&key)
                .is_some_and(|existing| existing.score >= record.score);
            if !keep_existing {
                self.records.insert(key, record);
                changed = true;
            }
        }

        MergeOutcome::Merged { changed }
    }

    /// Mark a category as having delivered everything
    pub fn mark_completed(&mut self, category: EntityCategory) -> bool {
        self.transition(category, CategoryStatus::Completed)
    }

    /// Mark a category as failed. Records it already contributed are dropped.
    pub fn mark_failed(&mut self, category: EntityCategory, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if !self.transition(category, CategoryStatus::Failed(reason.clone())) {
            return false;
        }
        self.records.retain(|(c, _), _| *c != category);
        self.failures.push(CategoryFailure { category, reason });
        true
    }

    /// Mark a category as stopped before completion
    pub fn mark_cancelled(&mut self, category: EntityCategory) -> bool {
        self.transition(category, CategoryStatus::Cancelled)
    }

    fn transition(&mut self, category: EntityCategory, next: CategoryStatus) -> bool {
        match self.statuses.get_mut(&category) {
            Some(status @ CategoryStatus::Pending) => {
                *status = next;
                true
            }
            _ => false,
        }
    }

    /// Force finalization: pending categories are cancelled
    pub fn finalize_on_deadline(&mut self) {
        for status in self.statuses.values_mut() {
            if *status == CategoryStatus::Pending {
                *status = CategoryStatus::Cancelled;
            }
        }
        self.deadline_exceeded = true;
    }

    pub fn status(&self, category: EntityCategory) -> Option<&CategoryStatus> {
        self.statuses.get(&category)
    }

    /// Categories still streaming
    pub fn pending(&self) -> Vec<EntityCategory> {
        self.statuses
            .iter()
            .filter(|(_, s)| !s.is_terminal())
            .map(|(c, _)| *c)
            .collect()
    }

    /// Every dispatched category reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.statuses.values().all(CategoryStatus::is_terminal)
    }

    /// Number of unique records merged so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current ranked view
    pub fn snapshot(&self) -> AggregatedResult {
        let mut ranked: Vec<&SearchRecord> = self.records.values().collect();
        ranked.sort_by(|a, b| self.compare(a, b));

        AggregatedResult {
            query: self.query.clone(),
            sequence: self.sequence,
            entries: ranked
                .into_iter()
                .take(self.max_results)
                .cloned()
                .collect(),
            total_matches: self.records.len(),
            categories: self.statuses.clone(),
            failures: self.failures.clone(),
            deadline_exceeded: self.deadline_exceeded,
        }
    }

    // score desc, then precedence, then label, then id
    fn compare(&self, a: &SearchRecord, b: &SearchRecord) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| self.precedence_rank(a.category).cmp(&self.precedence_rank(b.category)))
            .then_with(|| a.label.cmp(&b.label))
            .then_with(|| a.id.cmp(&b.id))
    }

    fn precedence_rank(&self, category: EntityCategory) -> (usize, EntityCategory) {
        let position = self
            .precedence
            .iter()
            .position(|c| *c == category)
            .unwrap_or(self.precedence.len());
        (position, category)
    }
}
