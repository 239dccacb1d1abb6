//! Search domain events
//!
//! Lifecycle events for search requests. The aggregate id of every event is
//! the id of the request it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{AggregatedResult, EntityCategory};
use super::registry::SearchRequest;
use crate::domain::events::DomainEvent;

/// Type of search event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEventType {
    /// A request was fanned out to the category clients
    SearchDispatched,
    /// A caller attached to an identical in-flight request
    SearchJoined,
    /// A request was cancelled by a request for a different query
    SearchSuperseded,
    /// One category failed; the search continues without it
    CategoryFailed,
    /// A request produced its final result
    SearchCompleted,
}

impl SearchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchDispatched => "search_dispatched",
            Self::SearchJoined => "search_joined",
            Self::SearchSuperseded => "search_superseded",
            Self::CategoryFailed => "category_failed",
            Self::SearchCompleted => "search_completed",
        }
    }
}

impl std::fmt::Display for SearchEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A search domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEvent {
    pub id: Uuid,
    /// Id of the request
    pub aggregate_id: Uuid,
    pub event_type: SearchEventType,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl SearchEvent {
    pub fn new(
        aggregate_id: Uuid,
        event_type: SearchEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn dispatched(request: &SearchRequest, categories: &[EntityCategory]) -> Self {
        let data = serde_json::json!({
            "query": request.query().key(),
            "sequence": request.sequence(),
            "categories": categories,
        });
        Self::new(request.id(), SearchEventType::SearchDispatched, Some(data))
    }

    pub fn joined(request: &SearchRequest) -> Self {
        let data = serde_json::json!({
            "query": request.query().key(),
            "sequence": request.sequence(),
        });
        Self::new(request.id(), SearchEventType::SearchJoined, Some(data))
    }

    pub fn superseded(request: &SearchRequest, superseded_by: &SearchRequest) -> Self {
        let data = serde_json::json!({
            "query": request.query().key(),
            "sequence": request.sequence(),
            "superseded_by": superseded_by.query().key(),
            "superseded_by_sequence": superseded_by.sequence(),
        });
        Self::new(request.id(), SearchEventType::SearchSuperseded, Some(data))
    }

    pub fn category_failed(request: &SearchRequest, category: EntityCategory, reason: &str) -> Self {
        let data = serde_json::json!({
            "query": request.query().key(),
            "sequence": request.sequence(),
            "category": category,
            "reason": reason,
        });
        Self::new(request.id(), SearchEventType::CategoryFailed, Some(data))
    }

    pub fn completed(request: &SearchRequest, result: &AggregatedResult) -> Self {
        let data = serde_json::json!({
            "query": request.query().key(),
            "sequence": request.sequence(),
            "entries": result.entries.len(),
            "total_matches": result.total_matches,
            "partial": result.is_partial(),
            "deadline_exceeded": result.deadline_exceeded,
        });
        Self::new(request.id(), SearchEventType::SearchCompleted, Some(data))
    }
}

impl DomainEvent for SearchEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}
