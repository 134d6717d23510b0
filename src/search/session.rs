// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Paginated search sessions
//!
//! A [`PaginatedSearch`] holds the accumulated results of the active query.
//! Phases:
//!
//! ```text
//! Empty -> Loading -> Loaded <-> LoadingMore -> Loaded | Exhausted
//!             \                      \
//!              `-> Error              `-> Error
//! ```
//!
//! Every `search` or `reset_search` bumps a generation counter; a response
//! that arrives for an older generation is dropped instead of merged.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

use super::cache::CacheStats;
use super::client::SearchClient;
use super::config::SearchConfig;
use super::credentials::PoolStatus;
use super::types::{normalize_query, PageOrigin, ResultItem, ResultPage, SearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Empty,
    Loading,
    Loaded,
    LoadingMore,
    Exhausted,
    Error,
}

/// What consumers observe of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub query: String,
    pub results: Vec<ResultItem>,
    pub phase: SessionPhase,
    pub has_more: bool,
    pub pages_fetched: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Some results are degraded output from an expired cache entry
    pub stale: bool,
    /// Origin of the most recently merged page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_origin: Option<PageOrigin>,
}

impl SessionSnapshot {
    fn empty() -> Self {
        Self {
            query: String::new(),
            results: Vec::new(),
            phase: SessionPhase::Empty,
            has_more: false,
            pages_fetched: 0,
            error: None,
            stale: false,
            last_origin: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Loading | SessionPhase::LoadingMore)
    }
}

struct SessionState {
    snapshot: SessionSnapshot,
    generation: u64,
    /// Normalized image locations already in `snapshot.results`
    seen: HashSet<String>,
}

impl SessionState {
    fn reset(&mut self) {
        self.generation += 1;
        self.snapshot = SessionSnapshot::empty();
        self.seen.clear();
    }

    /// Append unseen items up to `max_results`; returns how many were added
    fn merge(&mut self, page: ResultPage, max_results: usize) -> usize {
        let mut added = 0;
        for item in page.items {
            if self.snapshot.results.len() >= max_results {
                break;
            }
            if self.seen.insert(item.normalized_location().to_string()) {
                self.snapshot.results.push(item);
                added += 1;
            }
        }
        self.snapshot.stale |= page.stale;
        self.snapshot.last_origin = Some(page.origin);
        added
    }

    fn fail(&mut self, error: SearchError) {
        self.snapshot.phase = SessionPhase::Error;
        self.snapshot.has_more = false;
        self.snapshot.error = Some(error.to_string());
    }
}

/// Query-session facade over a shared [`SearchClient`]
pub struct PaginatedSearch {
    client: Arc<SearchClient>,
    state: Mutex<SessionState>,
    updates: watch::Sender<SessionSnapshot>,
    max_pages: u32,
    max_results: usize,
}

impl PaginatedSearch {
    /// Create a session; page limits come from `config`
    pub fn new(client: Arc<SearchClient>, config: &SearchConfig) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::empty());
        Self {
            client,
            state: Mutex::new(SessionState {
                snapshot: SessionSnapshot::empty(),
                generation: 0,
                seen: HashSet::new(),
            }),
            updates,
            max_pages: config.max_pages,
            max_results: config.max_results,
        }
    }

    /// Start a new session for `query`, replacing the current one
    pub async fn search(&self, query: &str) -> SessionSnapshot {
        let generation = {
            let mut state = self.lock();
            state.reset();
            if normalize_query(query).is_empty() {
                return self.publish(&state);
            }
            state.snapshot.query = query.trim().to_string();
            state.snapshot.phase = SessionPhase::Loading;
            self.publish(&state);
            state.generation
        };

        let result = self.client.fetch_page(query, 1).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!("Discarding first page of a superseded search");
            return state.snapshot.clone();
        }

        match result {
            Ok(page) => {
                let upstream_count = page.upstream_count;
                state.merge(page, self.max_results);
                state.snapshot.pages_fetched = 1;
                state.snapshot.has_more = self.has_more(&state, upstream_count);
                state.snapshot.phase = SessionPhase::Loaded;
                info!(
                    "Search loaded {} result(s), has_more={}",
                    state.snapshot.results.len(),
                    state.snapshot.has_more
                );
            }
            Err(e) => state.fail(e),
        }
        self.publish(&state)
    }

    /// Fetch and merge the next page
    ///
    /// Ignored unless the session is Loaded with more pages available, which
    /// also makes a second call during an in-flight one a no-op.
    pub async fn load_more(&self) -> SessionSnapshot {
        let (generation, query, next_page) = {
            let mut state = self.lock();
            if state.snapshot.phase != SessionPhase::Loaded || !state.snapshot.has_more {
                return state.snapshot.clone();
            }
            state.snapshot.phase = SessionPhase::LoadingMore;
            self.publish(&state);
            (
                state.generation,
                state.snapshot.query.clone(),
                state.snapshot.pages_fetched + 1,
            )
        };

        let result = self.client.fetch_page(&query, next_page).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!("Discarding page {} of a superseded search", next_page);
            return state.snapshot.clone();
        }

        match result {
            Ok(page) => {
                let upstream_count = page.upstream_count;
                let added = state.merge(page, self.max_results);
                state.snapshot.pages_fetched = next_page;
                if added == 0 {
                    state.snapshot.has_more = false;
                    state.snapshot.phase = SessionPhase::Exhausted;
                    debug!("Page {} added nothing new, session exhausted", next_page);
                } else {
                    state.snapshot.has_more = self.has_more(&state, upstream_count);
                    state.snapshot.phase = SessionPhase::Loaded;
                }
            }
            Err(e) => state.fail(e),
        }
        self.publish(&state)
    }

    /// Drop the current session and any in-flight response for it
    pub fn reset_search(&self) {
        let mut state = self.lock();
        state.reset();
        self.publish(&state);
    }

    /// Current session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot.clone()
    }

    /// Receive every session state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.client.pool_status()
    }

    /// Entry counts of the shared result cache
    pub fn cache_stats(&self) -> CacheStats {
        self.client.cache().stats()
    }

    /// Administrative: return every credential to rotation
    pub fn reset_all_credentials(&self) -> PoolStatus {
        self.client.pool().reset_all()
    }

    fn has_more(&self, state: &SessionState, upstream_count: usize) -> bool {
        upstream_count >= self.client.page_size()
            && state.snapshot.pages_fetched < self.max_pages
            && state.snapshot.results.len() < self.max_results
    }

    fn publish(&self, state: &SessionState) -> SessionSnapshot {
        let snapshot = state.snapshot.clone();
        self.updates.send_replace(snapshot.clone());
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fallback::FallbackProvider;
    use crate::search::provider::{ImageSearchProvider, ProviderError, ProviderImage, ProviderRequest};
    use crate::search::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Serves `per_page` distinct images per page; pages after the first can be gated
    struct PagedProvider {
        per_page: usize,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
        /// Index of an animated GIF on every page
        gif_at: Option<usize>,
        /// Provider-side page size cap
        limit: Option<usize>,
    }

    impl PagedProvider {
        fn new(per_page: usize) -> Arc<Self> {
            Arc::new(Self {
                per_page,
                gate: None,
                calls: AtomicUsize::new(0),
                gif_at: None,
                limit: None,
            })
        }

        fn with_gif_at(per_page: usize, index: usize) -> Arc<Self> {
            Arc::new(Self {
                per_page,
                gate: None,
                calls: AtomicUsize::new(0),
                gif_at: Some(index),
                limit: None,
            })
        }

        fn limited(limit: usize) -> Arc<Self> {
            Arc::new(Self {
                per_page: usize::MAX,
                gate: None,
                calls: AtomicUsize::new(0),
                gif_at: None,
                limit: Some(limit),
            })
        }

        fn gated(per_page: usize, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                per_page,
                gate: Some(gate),
                calls: AtomicUsize::new(0),
                gif_at: None,
                limit: None,
            })
        }
    }

    #[async_trait]
    impl ImageSearchProvider for PagedProvider {
        async fn search_images(
            &self,
            request: &ProviderRequest,
        ) -> Result<Vec<ProviderImage>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.page > 1 {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
            }
            let slug = request.query.replace(' ', "-");
            let count = self.per_page.min(request.page_size as usize);
            Ok((0..count)
                .map(|i| {
                    let ext = if self.gif_at == Some(i) { "gif" } else { "png" };
                    ProviderImage {
                        title: format!("{} {}", request.query, i),
                        image_location: format!(
                            "https://img.example.com/{}/{}-{}.{}",
                            slug, request.page, i, ext
                        ),
                        context_location: None,
                        display_origin: None,
                    }
                })
                .collect())
        }

        fn name(&self) -> &'static str {
            "paged"
        }

        fn max_page_size(&self) -> Option<usize> {
            self.limit
        }
    }

    fn config(keys: &[&str]) -> SearchConfig {
        SearchConfig {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            engine_id: "cx".to_string(),
            rate_limit_per_minute: 10_000,
            transient_retry_delay_ms: 1,
            ..SearchConfig::default()
        }
    }

    fn session_with(config: SearchConfig, provider: Arc<dyn ImageSearchProvider>) -> PaginatedSearch {
        let client = SearchClient::new(&config, provider, Arc::new(MemoryStore::new()));
        PaginatedSearch::new(Arc::new(client), &config)
    }

    #[tokio::test]
    async fn test_search_loads_first_page() {
        let session = session_with(config(&["k1"]), PagedProvider::new(10));

        let snapshot = session.search("network diagram").await;
        assert_eq!(snapshot.phase, SessionPhase::Loaded);
        assert_eq!(snapshot.results.len(), 10);
        assert_eq!(snapshot.pages_fetched, 1);
        assert!(snapshot.has_more);
        assert_eq!(snapshot.last_origin, Some(PageOrigin::Live));
    }

    #[tokio::test]
    async fn test_short_first_page_has_no_more() {
        let session = session_with(config(&["k1"]), PagedProvider::new(4));

        let snapshot = session.search("network diagram").await;
        assert_eq!(snapshot.phase, SessionPhase::Loaded);
        assert!(!snapshot.has_more);

        // load_more is a no-op without more pages
        let after = session.load_more().await;
        assert_eq!(after.pages_fetched, 1);
        assert_eq!(after.results.len(), 4);
    }

    #[tokio::test]
    async fn test_filtered_gif_does_not_end_paging() {
        let session = session_with(config(&["k1"]), PagedProvider::with_gif_at(10, 3));

        let first = session.search("network").await;
        assert_eq!(first.results.len(), 9);
        assert!(first.has_more);
        assert!(first.results.iter().all(|r| !r.image_location.ends_with(".gif")));

        let second = session.load_more().await;
        assert_eq!(second.results.len(), 18);
        assert_eq!(second.phase, SessionPhase::Loaded);
        assert!(second.has_more);

        // Served from cache, still reports the full upstream page
        let again = session.search("network").await;
        assert_eq!(again.last_origin, Some(PageOrigin::Cache));
        assert!(again.has_more);
    }

    #[tokio::test]
    async fn test_page_size_clamped_to_provider_limit() {
        let mut cfg = config(&["k1"]);
        cfg.page_size = 20;
        cfg.max_results = 60;
        let provider = PagedProvider::limited(10);
        let client = Arc::new(SearchClient::new(&cfg, provider, Arc::new(MemoryStore::new())));
        assert_eq!(client.page_size(), 10);

        let session = PaginatedSearch::new(client, &cfg);
        let first = session.search("network").await;
        assert_eq!(first.results.len(), 10);
        assert!(first.has_more);
    }

    #[tokio::test]
    async fn test_load_more_stops_at_result_ceiling() {
        let session = session_with(config(&["k1"]), PagedProvider::new(10));

        session.search("flowchart").await;
        let second = session.load_more().await;
        assert_eq!(second.results.len(), 20);
        assert!(second.has_more);

        let third = session.load_more().await;
        assert_eq!(third.results.len(), 30);
        assert_eq!(third.pages_fetched, 3);
        assert!(!third.has_more);
        assert_eq!(third.phase, SessionPhase::Loaded);

        let fourth = session.load_more().await;
        assert_eq!(fourth.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_load_more_stops_at_page_ceiling() {
        let mut cfg = config(&["k1"]);
        cfg.max_pages = 2;
        cfg.max_results = 100;
        let session = session_with(cfg, PagedProvider::new(10));

        session.search("flowchart").await;
        let second = session.load_more().await;
        assert_eq!(second.pages_fetched, 2);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_cyclic_fallback_ends_in_exhausted() {
        let session = session_with(config(&[]), PagedProvider::new(10));

        let first = session.search("network diagram").await;
        assert_eq!(first.last_origin, Some(PageOrigin::Fallback));
        assert_eq!(first.results.len(), 10);
        assert!(first.has_more);

        // The network collection has exactly one page, so page 2 repeats it
        let second = session.load_more().await;
        assert_eq!(second.phase, SessionPhase::Exhausted);
        assert!(!second.has_more);
        assert_eq!(second.results.len(), 10);
    }

    #[tokio::test]
    async fn test_blank_query_leaves_session_empty() {
        let provider = PagedProvider::new(10);
        let session = session_with(config(&["k1"]), provider.clone());

        let snapshot = session.search("   ").await;
        assert_eq!(snapshot.phase, SessionPhase::Empty);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_sources_exhausted_is_error() {
        let cfg = config(&[]);
        let client = SearchClient::new(&cfg, PagedProvider::new(10), Arc::new(MemoryStore::new()))
            .with_fallback(FallbackProvider::with_collections(Vec::new()));
        let session = PaginatedSearch::new(Arc::new(client), &cfg);

        let snapshot = session.search("network").await;
        assert_eq!(snapshot.phase, SessionPhase::Error);
        assert!(snapshot.error.unwrap().contains("exhausted"));
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn test_reset_search() {
        let session = session_with(config(&["k1"]), PagedProvider::new(10));
        session.search("network").await;

        session.reset_search();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Empty);
        assert!(snapshot.results.is_empty());
        assert!(snapshot.query.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_load_more_is_ignored() {
        let gate = Arc::new(Notify::new());
        let provider = PagedProvider::gated(10, gate.clone());
        let session = Arc::new(session_with(config(&["k1"]), provider.clone()));
        session.search("network").await;

        let background = {
            let session = session.clone();
            tokio::spawn(async move { session.load_more().await })
        };
        while session.snapshot().phase != SessionPhase::LoadingMore {
            tokio::task::yield_now().await;
        }

        let ignored = session.load_more().await;
        assert_eq!(ignored.phase, SessionPhase::LoadingMore);
        assert!(ignored.is_loading());

        gate.notify_one();
        let done = background.await.unwrap();
        assert_eq!(done.results.len(), 20);
        // One call for page 1, one for page 2
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_new_search_discards_in_flight_load_more() {
        let gate = Arc::new(Notify::new());
        let provider = PagedProvider::gated(10, gate.clone());
        let session = Arc::new(session_with(config(&["k1"]), provider));
        session.search("network").await;

        let background = {
            let session = session.clone();
            tokio::spawn(async move { session.load_more().await })
        };
        while session.snapshot().phase != SessionPhase::LoadingMore {
            tokio::task::yield_now().await;
        }

        let replaced = session.search("flowchart").await;
        assert_eq!(replaced.query, "flowchart");

        gate.notify_one();
        background.await.unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.query, "flowchart");
        assert_eq!(snapshot.results.len(), 10);
        assert!(snapshot
            .results
            .iter()
            .all(|r| r.image_location.contains("/flowchart/")));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let session = session_with(config(&["k1"]), PagedProvider::new(10));
        let mut updates = session.subscribe();

        session.search("network").await;
        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest.phase, SessionPhase::Loaded);
        assert_eq!(latest.results.len(), 10);
    }

    #[tokio::test]
    async fn test_pool_status_and_reset() {
        let session = session_with(config(&["k1", "k2"]), PagedProvider::new(10));
        let status = session.pool_status();
        assert_eq!(status.total_credentials, 2);
        assert_eq!(status.available_credentials, 2);

        session.search("network").await;
        assert_eq!(session.pool_status().total_usage, 1);

        let reset = session.reset_all_credentials();
        assert_eq!(reset.total_usage, 0);
        assert_eq!(reset.available_credentials, 2);
    }
    #[tokio::test]
    async fn test_cache_stats_track_loaded_pages() {
        let session = session_with(config(&["k1"]), PagedProvider::new(10));
        assert_eq!(session.cache_stats().total, 0);

        session.search("network").await;
        session.load_more().await;

        let stats = session.cache_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.max, 200);
    }
}
