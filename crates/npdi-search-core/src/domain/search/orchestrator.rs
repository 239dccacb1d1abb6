//! Search orchestration
//!
//! [`SearchOrchestrator::search_all`] is the single entry point used by the
//! search bar. It normalizes the query, serves a cached result while
//! revalidating, collapses identical in-flight requests, supersedes stale
//! ones and streams progressively merged snapshots to the caller.

use futures_util::future;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregator::{MergeOutcome, ResultAggregator};
use super::cache::SearchCache;
use super::client::EntitySearchClient;
use super::entity::{AggregatedResult, CategoryResult, EntityCategory, ResultSnapshot};
use super::event::SearchEvent;
use super::query::{NormalizedQuery, normalize};
use super::registry::{RequestRegistry, RequestStart, SearchRequest};
use crate::config::SearchSettings;
use crate::domain::events::EventPublisher;
use crate::error::{Error, Result};

/// Builder for creating a SearchOrchestrator
#[derive(Default)]
pub struct SearchOrchestratorBuilder {
    clients: Vec<Arc<dyn EntitySearchClient>>,
    cache: Option<Arc<SearchCache>>,
    registry: Option<Arc<RequestRegistry>>,
    settings: Option<SearchSettings>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl SearchOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the client for one category
    pub fn client(mut self, client: Arc<dyn EntitySearchClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Register several clients
    pub fn clients(mut self, clients: impl IntoIterator<Item = Arc<dyn EntitySearchClient>>) -> Self {
        self.clients.extend(clients);
        self
    }

    /// Share an existing cache (defaults to a new one sized from the settings)
    pub fn cache(mut self, cache: Arc<SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing registry
    pub fn registry(mut self, registry: Arc<RequestRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn settings(mut self, settings: SearchSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Publish search lifecycle events
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<SearchOrchestrator> {
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        for (index, client) in self.clients.iter().enumerate() {
            let category = client.category();
            if self.clients[..index].iter().any(|c| c.category() == category) {
                return Err(Error::DuplicateCategory(category));
            }
        }

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(SearchCache::new(settings.cache_capacity)?),
        };

        Ok(SearchOrchestrator {
            clients: self.clients,
            cache,
            registry: self.registry.unwrap_or_default(),
            settings,
            events: self.events,
        })
    }
}

/// Entry point for officer, unit and agency search
#[derive(Clone)]
pub struct SearchOrchestrator {
    clients: Vec<Arc<dyn EntitySearchClient>>,
    cache: Arc<SearchCache>,
    registry: Arc<RequestRegistry>,
    settings: SearchSettings,
    events: Option<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("categories", &self.categories())
            .field("cache", &self.cache.stats())
            .field("registry", &self.registry.stats())
            .field("settings", &self.settings)
            .finish()
    }
}

impl SearchOrchestrator {
    pub fn builder() -> SearchOrchestratorBuilder {
        SearchOrchestratorBuilder::new()
    }

    /// Categories with a registered client, in registration order
    pub fn categories(&self) -> Vec<EntityCategory> {
        self.clients.iter().map(|c| c.category()).collect()
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Search every category for `raw`.
    ///
    /// The returned subscription yields, in order: the cached result for the
    /// query (if any and no live result exists yet), progressive snapshots, and
    /// one final snapshot. It ends early when a search for a different query
    /// supersedes this one. An empty query yields a single cleared snapshot.
    pub async fn search_all(&self, raw: &str) -> Result<SearchSubscription> {
        if self.clients.is_empty() {
            return Err(Error::NoCategoriesConfigured);
        }

        let query = normalize(raw);
        if query.is_empty() {
            debug!("Empty search query, clearing results");
            return Ok(SearchSubscription::cleared(query));
        }

        let cached = self.cache.get(query.key());
        let start = self.registry.start(query);

        match start {
            RequestStart::Joined(request) => {
                self.emit(SearchEvent::joined(&request)).await;
                Ok(SearchSubscription::attach(request, cached, true))
            }
            RequestStart::Started {
                request,
                superseded,
            } => {
                if let Some(previous) = &superseded {
                    self.emit(SearchEvent::superseded(previous, &request)).await;
                }
                // Subscribe before the driver exists so the cached result is
                // queued ahead of anything the driver publishes.
                let subscription = SearchSubscription::attach(Arc::clone(&request), cached, false);
                self.dispatch(request).await;
                Ok(subscription)
            }
        }
    }

    async fn dispatch(&self, request: Arc<SearchRequest>) {
        let categories = self.categories();
        info!(
            query = %request.query(),
            sequence = request.sequence(),
            categories = categories.len(),
            "Dispatching search"
        );
        self.emit(SearchEvent::dispatched(&request, &categories)).await;
        tokio::spawn(self.driver(request).run());
    }

    fn driver(&self, request: Arc<SearchRequest>) -> RequestDriver {
        RequestDriver {
            request,
            clients: self.clients.clone(),
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            settings: self.settings.clone(),
            events: self.events.clone(),
        }
    }

    async fn emit(&self, event: SearchEvent) {
        emit(self.events.as_ref(), event).await;
    }
}

async fn emit(events: Option<&Arc<dyn EventPublisher>>, event: SearchEvent) {
    if let Some(publisher) = events
        && let Err(err) = publisher.publish(&event).await
    {
        warn!(
            event_type = %event.event_type,
            error = %err,
            "Failed to publish search event"
        );
    }
}

type TaggedChunk = (EntityCategory, Option<Result<CategoryResult>>);

/// One client's chunks, tagged with its category and terminated by a `None`
/// marker so completion is observed per category. A panicking client turns
/// into a failure of its own category.
fn category_stream(
    client: &dyn EntitySearchClient,
    query: &NormalizedQuery,
    cancel: CancellationToken,
) -> BoxStream<'static, TaggedChunk> {
    let category = client.category();
    let chunks = match panic::catch_unwind(AssertUnwindSafe(|| client.search(query, cancel))) {
        Ok(chunks) => AssertUnwindSafe(chunks)
            .catch_unwind()
            .map(move |item| {
                item.unwrap_or_else(|payload| Err(client_panicked(category, payload.as_ref())))
            })
            .boxed(),
        Err(payload) => {
            let err = client_panicked(category, payload.as_ref());
            stream::once(future::ready(Err(err))).boxed()
        }
    };

    chunks
        .map(move |item| (category, Some(item)))
        .chain(stream::once(future::ready((category, None))))
        .boxed()
}

fn client_panicked(category: EntityCategory, payload: &(dyn Any + Send)) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    Error::category_unavailable(category, format!("search client panicked: {message}"))
}

/// Runs one request: fans out to every client and merges their chunks
struct RequestDriver {
    request: Arc<SearchRequest>,
    clients: Vec<Arc<dyn EntitySearchClient>>,
    cache: Arc<SearchCache>,
    registry: Arc<RequestRegistry>,
    settings: SearchSettings,
    events: Option<Arc<dyn EventPublisher>>,
}

impl RequestDriver {
    async fn run(self) {
        let request = Arc::clone(&self.request);
        let query = request.query().clone();
        let sequence = request.sequence();
        let cancel = request.cancellation_token().clone();
        let fan_out = cancel.child_token();

        let mut aggregator = ResultAggregator::new(
            query.clone(),
            sequence,
            self.clients.iter().map(|c| c.category()),
            &self.settings,
        );

        let streams = self
            .clients
            .iter()
            .map(|client| category_stream(client.as_ref(), &query, fan_out.clone()));
        let mut chunks = stream::select_all(streams);

        let deadline = self.settings.deadline();
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        while !aggregator.is_finished() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(query = %query, sequence, "Search superseded, stopping driver");
                    return;
                }
                _ = &mut expired => {
                    warn!(
                        query = %query,
                        sequence,
                        pending = ?aggregator.pending(),
                        "Search deadline elapsed, finalizing with partial results"
                    );
                    aggregator.finalize_on_deadline();
                    fan_out.cancel();
                }
                item = chunks.next() => match item {
                    Some((category, Some(Ok(chunk)))) => {
                        if !self.merge(&mut aggregator, category, chunk) {
                            fan_out.cancel();
                            return;
                        }
                    }
                    Some((category, Some(Err(err)))) => {
                        self.fail(&mut aggregator, category, err).await;
                    }
                    Some((category, None)) => {
                        if aggregator.mark_completed(category) {
                            debug!(query = %query, sequence, category = %category, "Category completed");
                        }
                    }
                    None => break,
                },
            }
        }

        self.finalize(aggregator).await;
    }

    /// Merge one chunk; false when the request is stale
    fn merge(
        &self,
        aggregator: &mut ResultAggregator,
        category: EntityCategory,
        chunk: CategoryResult,
    ) -> bool {
        let chunk = if chunk.category == category {
            chunk
        } else {
            CategoryResult::new(category, chunk.records)
        };
        let records = chunk.records.len();

        match aggregator.merge(chunk, self.request.sequence(), self.registry.current_sequence()) {
            MergeOutcome::Stale => {
                debug!(
                    query = %self.request.query(),
                    sequence = self.request.sequence(),
                    "Dropping chunk for stale search"
                );
                false
            }
            MergeOutcome::Merged { changed } => {
                debug!(
                    query = %self.request.query(),
                    category = %category,
                    records,
                    changed,
                    "Merged search chunk"
                );
                if changed {
                    self.request
                        .publish(ResultSnapshot::progressive(aggregator.snapshot()));
                }
                true
            }
            MergeOutcome::Ignored => true,
        }
    }

    async fn fail(&self, aggregator: &mut ResultAggregator, category: EntityCategory, err: Error) {
        let reason = match err {
            Error::CategoryUnavailable { reason, .. } => reason,
            other => other.to_string(),
        };
        if !aggregator.mark_failed(category, reason.clone()) {
            return;
        }

        warn!(
            query = %self.request.query(),
            sequence = self.request.sequence(),
            category = %category,
            reason = %reason,
            "Search category failed, continuing without it"
        );
        emit(
            self.events.as_ref(),
            SearchEvent::category_failed(&self.request, category, &reason),
        )
        .await;
        self.request
            .publish(ResultSnapshot::progressive(aggregator.snapshot()));
    }

    async fn finalize(self, aggregator: ResultAggregator) {
        let request = &self.request;
        if request.is_cancelled() || !self.registry.is_current(request.sequence()) {
            debug!(query = %request.query(), "Search superseded before finalization");
            return;
        }

        // Complete before publishing so a caller that has seen the final
        // result never joins this request again.
        let result = aggregator.snapshot();
        self.cache.put(request.query().key(), result.clone());
        self.registry.complete(request);
        request.publish(ResultSnapshot::final_result(result.clone()));

        info!(
            query = %request.query(),
            sequence = request.sequence(),
            entries = result.entries.len(),
            total_matches = result.total_matches,
            partial = result.is_partial(),
            "Search completed"
        );
        emit(self.events.as_ref(), SearchEvent::completed(request, &result)).await;
    }
}

/// Snapshots delivered to one `search_all` caller
#[derive(Debug)]
pub struct SearchSubscription {
    query: NormalizedQuery,
    live: Option<(Arc<SearchRequest>, watch::Receiver<Option<ResultSnapshot>>)>,
    pending: VecDeque<ResultSnapshot>,
    joined: bool,
    finished: bool,
}

impl SearchSubscription {
    fn cleared(query: NormalizedQuery) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(ResultSnapshot::cleared(query.clone()));
        Self {
            query,
            live: None,
            pending,
            joined: false,
            finished: false,
        }
    }

    fn attach(request: Arc<SearchRequest>, cached: Option<AggregatedResult>, joined: bool) -> Self {
        let mut receiver = request.subscribe();
        let mut pending = VecDeque::new();

        // A joiner may find live results already; they win over the cache.
        let live = receiver.borrow_and_update().clone();
        match (live, cached) {
            (Some(snapshot), _) => pending.push_back(snapshot),
            (None, Some(cached)) => pending.push_back(ResultSnapshot::cached(cached)),
            (None, None) => {}
        }

        Self {
            query: request.query().clone(),
            live: Some((request, receiver)),
            pending,
            joined,
            finished: false,
        }
    }

    pub fn query(&self) -> &NormalizedQuery {
        &self.query
    }

    /// Sequence of the underlying request; `None` for a cleared query
    pub fn sequence(&self) -> Option<u64> {
        self.live.as_ref().map(|(request, _)| request.sequence())
    }

    pub fn request_id(&self) -> Option<Uuid> {
        self.live.as_ref().map(|(request, _)| request.id())
    }

    /// Whether this caller joined an identical in-flight request
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Whether the request was superseded by a different query
    pub fn is_superseded(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|(request, _)| request.is_cancelled())
    }

    /// Next snapshot, or `None` once the final snapshot was delivered or the
    /// request was superseded
    pub async fn next(&mut self) -> Option<ResultSnapshot> {
        while !self.finished {
            if self.is_superseded() {
                self.finish();
                break;
            }

            if let Some(snapshot) = self.pending.pop_front() {
                if !snapshot.is_provisional() {
                    self.finished = true;
                }
                return Some(snapshot);
            }

            let Some((request, receiver)) = self.live.as_mut() else {
                self.finished = true;
                break;
            };

            let cancel = request.cancellation_token().clone();
            let changed = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                changed = receiver.changed() => changed.is_ok(),
            };
            if !changed {
                self.finish();
                break;
            }

            let latest = receiver.borrow_and_update().clone();
            if let Some(snapshot) = latest {
                self.pending.push_back(snapshot);
            }
        }
        None
    }

    /// Wait for the terminal result, skipping provisional snapshots.
    /// Returns `None` if the request was superseded.
    pub async fn wait_final(mut self) -> Option<AggregatedResult> {
        while let Some(snapshot) = self.next().await {
            if !snapshot.is_provisional() {
                return Some(snapshot.result);
            }
        }
        None
    }

    /// Adapt the subscription into a stream of snapshots
    pub fn into_stream(mut self) -> BoxStream<'static, ResultSnapshot> {
        async_stream::stream! {
            while let Some(snapshot) = self.next().await {
                yield snapshot;
            }
        }
        .boxed()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
    }
}
