//! Request registry
//!
//! Tracks the single active search request. Starting a request for a
//! different normalized query supersedes (and cancels) the active one, while
//! starting one for the same query joins it instead of dispatching again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::entity::ResultSnapshot;
use super::query::NormalizedQuery;

/// One normalized query dispatched to every configured category
#[derive(Debug)]
pub struct SearchRequest {
    id: Uuid,
    query: NormalizedQuery,
    sequence: u64,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    snapshots: watch::Sender<Option<ResultSnapshot>>,
}

impl SearchRequest {
    fn new(query: NormalizedQuery, sequence: u64) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            id: Uuid::new_v4(),
            query,
            sequence,
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            snapshots,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &NormalizedQuery {
        &self.query
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Token cancelled when the request is superseded
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Replace the latest live snapshot. No-op once the request is cancelled.
    pub fn publish(&self, snapshot: ResultSnapshot) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.snapshots.send_replace(Some(snapshot));
        true
    }

    /// Latest live snapshot, if any was published
    pub fn latest(&self) -> Option<ResultSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<ResultSnapshot>> {
        self.snapshots.subscribe()
    }
}

/// Outcome of [`RequestRegistry::start`]
#[derive(Debug, Clone)]
pub enum RequestStart {
    /// A new request was created and must be dispatched
    Started {
        request: Arc<SearchRequest>,
        /// The previously active request, now cancelled
        superseded: Option<Arc<SearchRequest>>,
    },
    /// An identical request is already in flight
    Joined(Arc<SearchRequest>),
}

impl RequestStart {
    pub fn request(&self) -> &Arc<SearchRequest> {
        match self {
            Self::Started { request, .. } | Self::Joined(request) => request,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined(_))
    }
}

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub started: u64,
    pub joined: u64,
    pub superseded: u64,
    pub completed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    active: Option<Arc<SearchRequest>>,
    last_sequence: u64,
    stats: RegistryStats,
}

/// Owner of the active search request
#[derive(Debug, Default)]
pub struct RequestRegistry {
    state: Mutex<RegistryState>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a request for `query`, joining or superseding the active one
    pub fn start(&self, query: NormalizedQuery) -> RequestStart {
        let mut state = self.lock();

        if let Some(active) = &state.active
            && active.query.key() == query.key()
            && !active.is_cancelled()
        {
            let request = Arc::clone(active);
            state.stats.joined += 1;
            debug!(
                query = %query,
                sequence = request.sequence,
                "Joined in-flight search request"
            );
            return RequestStart::Joined(request);
        }

        let superseded = state.active.take();
        if let Some(previous) = &superseded {
            previous.cancel.cancel();
            state.stats.superseded += 1;
            info!(
                query = %previous.query,
                sequence = previous.sequence,
                superseded_by = %query,
                "Superseded search request"
            );
        }

        state.last_sequence += 1;
        let request = Arc::new(SearchRequest::new(query, state.last_sequence));
        state.active = Some(Arc::clone(&request));
        state.stats.started += 1;

        debug!(
            query = %request.query,
            sequence = request.sequence,
            request_id = %request.id,
            "Started search request"
        );

        RequestStart::Started {
            request,
            superseded,
        }
    }

    /// Mark a request finished. Returns false if it was no longer active.
    pub fn complete(&self, request: &SearchRequest) -> bool {
        let mut state = self.lock();
        if !Self::is_active(&state, request) {
            return false;
        }
        state.active = None;
        state.stats.completed += 1;
        debug!(
            query = %request.query,
            sequence = request.sequence,
            "Completed search request"
        );
        true
    }

    /// Cancel a request. Returns false if it was no longer active.
    pub fn cancel(&self, request: &SearchRequest) -> bool {
        let mut state = self.lock();
        if !Self::is_active(&state, request) {
            return false;
        }
        state.active = None;
        request.cancel.cancel();
        state.stats.cancelled += 1;
        debug!(
            query = %request.query,
            sequence = request.sequence,
            "Cancelled search request"
        );
        true
    }

    fn is_active(state: &RegistryState, request: &SearchRequest) -> bool {
        state
            .active
            .as_ref()
            .is_some_and(|active| active.sequence == request.sequence)
    }

    /// Sequence number of the most recently started request (0 before the first)
    pub fn current_sequence(&self) -> u64 {
        self.lock().last_sequence
    }

    /// Whether results tagged with `sequence` may still be shown
    pub fn is_current(&self, sequence: u64) -> bool {
        self.current_sequence() == sequence
    }

    /// The active request, if any
    pub fn active(&self) -> Option<Arc<SearchRequest>> {
        self.lock().active.clone()
    }

    pub fn stats(&self) -> RegistryStats {
        self.lock().stats
    }
}
