// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search client orchestration
//!
//! Fetches one page at a time: cache first, then the live provider through
//! the credential pool, then degraded output (stale cache or fallback).
//!
//! Retry ladder for a single credential:
//! 1. quota / auth failure: mark the credential and move to the next one
//! 2. transient failure: wait, retry the same credential once
//! 3. second transient failure: treat as quota and move on
//!
//! Each Available credential is tried at most once per page request.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::ResultCache;
use super::config::SearchConfig;
use super::credentials::{CredentialLease, CredentialPool, FailureKind, PoolStatus};
use super::fallback::FallbackProvider;
use super::google::GoogleImageProvider;
use super::provider::{ImageSearchProvider, ProviderError, ProviderImage, ProviderRequest};
use super::rate_limiter::ProviderRateLimiter;
use super::ranking;
use super::store::{KeyValueStore, MemoryStore};
use super::types::{normalize_image_location, normalize_query, PageOrigin, ResultItem, ResultPage, SearchError};

/// Usable items of one live page plus how many the provider sent
struct LivePage {
    items: Vec<ResultItem>,
    upstream_count: usize,
}

/// Resilient single-page search over a credential pool
pub struct SearchClient {
    provider: Arc<dyn ImageSearchProvider>,
    pool: Arc<CredentialPool>,
    cache: Arc<ResultCache>,
    fallback: FallbackProvider,
    rate_limiter: ProviderRateLimiter,
    page_size: usize,
    retry_delay: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl SearchClient {
    /// Create a client around an existing provider and cache store
    ///
    /// The page size is clamped to what the provider can return in one call.
    /// When called inside a tokio runtime, a background task sweeps cache
    /// entries past the retention window until the client is dropped.
    pub fn new(
        config: &SearchConfig,
        provider: Arc<dyn ImageSearchProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let pool = CredentialPool::new(config.api_keys.iter().cloned(), config.credential_cooldown());
        let cache = Arc::new(ResultCache::new(
            store,
            config.cache_ttl_secs,
            config.cache_retention_secs,
            config.cache_max_entries,
        ));

        let page_size = match provider.max_page_size() {
            Some(max) if config.page_size > max => {
                warn!(
                    "Page size {} exceeds the {} provider limit, using {}",
                    config.page_size,
                    provider.name(),
                    max
                );
                max
            }
            _ => config.page_size,
        };

        let sweeper = tokio::runtime::Handle::try_current()
            .ok()
            .map(|_| cache.clone().spawn_sweeper(config.cache_sweep_interval()));

        let rate_limiter = ProviderRateLimiter::new(config.rate_limit_per_minute);
        debug!(
            "Search client using provider {} with {} credential(s), {} request(s)/min",
            provider.name(),
            pool.len(),
            rate_limiter.requests_per_minute()
        );

        Self {
            provider,
            pool: Arc::new(pool),
            cache,
            fallback: FallbackProvider::new(),
            rate_limiter,
            page_size,
            retry_delay: config.transient_retry_delay(),
            sweeper,
        }
    }

    /// Create a client backed by Google Custom Search and an in-memory cache
    pub fn from_config(config: &SearchConfig) -> Result<Self, String> {
        config.validate()?;
        let provider = GoogleImageProvider::new(config.engine_id.clone(), config.request_timeout())
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self::new(config, Arc::new(provider), Arc::new(MemoryStore::new())))
    }

    /// Replace the built-in fallback collections
    pub fn with_fallback(mut self, fallback: FallbackProvider) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Effective page size after the provider limit
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Fetch one page of ranked results
    ///
    /// Never fails because of the provider; only a blank query or an empty
    /// fallback source produce an error.
    pub async fn fetch_page(&self, query: &str, page: u32) -> Result<ResultPage, SearchError> {
        if normalize_query(query).is_empty() {
            return Err(SearchError::InvalidQuery {
                reason: "query is empty".to_string(),
            });
        }
        let page = page.max(1);

        // Check cache first
        if let Some(entry) = self.cache.get(query, page) {
            debug!("Cache hit for page {}", page);
            let upstream_count = entry.upstream_len();
            return Ok(ResultPage {
                query: query.to_string(),
                page,
                items: entry.results,
                origin: PageOrigin::Cache,
                stale: false,
                upstream_count,
            });
        }

        let start = Instant::now();
        match self.fetch_live(query, page).await {
            Ok(live) if !live.items.is_empty() => {
                let result = ResultPage {
                    query: query.to_string(),
                    page,
                    items: ranking::rank(live.items, query),
                    origin: PageOrigin::Live,
                    stale: false,
                    upstream_count: live.upstream_count,
                };
                self.cache.put_page(&result);
                info!(
                    "Search complete: {} results from {} in {}ms",
                    result.len(),
                    self.provider.name(),
                    start.elapsed().as_millis()
                );
                return Ok(result);
            }
            Ok(_) => info!("Provider returned no usable results for page {}, using fallback", page),
            Err(SearchError::PoolExhausted) => {
                if let Some(entry) = self.cache.get_stale(query, page) {
                    warn!("Credential pool exhausted, serving stale cache for page {}", page);
                    let upstream_count = entry.upstream_len();
                    return Ok(ResultPage {
                        query: query.to_string(),
                        page,
                        items: entry.results,
                        origin: PageOrigin::StaleCache,
                        stale: true,
                        upstream_count,
                    });
                }
                warn!("Credential pool exhausted, using fallback for page {}", page);
            }
            Err(e) => warn!("{}, using fallback for page {}", e, page),
        }

        self.fallback_page(query, page)
    }

    /// Try credentials in rotation until one answers
    async fn fetch_live(&self, query: &str, page: u32) -> Result<LivePage, SearchError> {
        let mut tried = BTreeSet::new();

        for _ in 0..self.pool.len() {
            let Some(lease) = self.pool.acquire() else {
                break;
            };
            if !tried.insert(lease.id().to_string()) {
                // Pool was reset mid-request and handed back a key we already used
                break;
            }

            let request = ProviderRequest {
                query: query.to_string(),
                api_key: lease.secret().to_string(),
                page,
                page_size: self.page_size as u32,
            };

            match self.try_credential(&lease, &request).await {
                Ok(images) => {
                    let upstream_count = images.len();
                    let items: Vec<ResultItem> = images
                        .into_iter()
                        .filter(|image| !image.is_animated())
                        .map(map_provider_image)
                        .collect();
                    if items.len() < upstream_count {
                        debug!("Dropped {} animated image(s)", upstream_count - items.len());
                    }
                    return Ok(LivePage {
                        items,
                        upstream_count,
                    });
                }
                Err(e @ (SearchError::QuotaExceeded { .. } | SearchError::TransientNetwork { .. })) => {
                    warn!("{}, rotating", e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(SearchError::PoolExhausted)
    }

    /// Call the provider with one credential, retrying a transient failure once
    ///
    /// Credential failures come back as `QuotaExceeded` or `TransientNetwork`
    /// after the pool has been told; the caller moves to the next credential.
    async fn try_credential(
        &self,
        lease: &CredentialLease,
        request: &ProviderRequest,
    ) -> Result<Vec<ProviderImage>, SearchError> {
        let mut retried = false;

        loop {
            self.rate_limiter.wait().await;

            match self.provider.search_images(request).await {
                Ok(images) => {
                    self.pool.report_success(lease);
                    return Ok(images);
                }
                Err(ProviderError::Transient { status, message }) if !retried => {
                    debug!(
                        "Transient error on {} (status {}): {}, retrying once",
                        lease.redacted(),
                        status,
                        message
                    );
                    self.pool.report_failure(lease, FailureKind::Transient);
                    retried = true;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(ProviderError::Transient { message, .. }) => {
                    self.pool.report_failure(lease, FailureKind::Quota);
                    return Err(SearchError::TransientNetwork {
                        message: format!("{message} (credential {}, after retry)", lease.redacted()),
                    });
                }
                Err(ProviderError::QuotaExceeded { status, message }) => {
                    debug!("Quota failure (status {}): {}", status, message);
                    self.pool.report_failure(lease, FailureKind::Quota);
                    return Err(SearchError::QuotaExceeded {
                        credential: lease.redacted(),
                    });
                }
                Err(ProviderError::InvalidCredential { message }) => {
                    debug!("Credential rejected: {}", message);
                    self.pool.report_failure(lease, FailureKind::Revoked);
                    return Err(SearchError::QuotaExceeded {
                        credential: lease.redacted(),
                    });
                }
                Err(ProviderError::Malformed { message }) => {
                    // The key worked; the body did not
                    self.pool.report_success(lease);
                    return Err(SearchError::MalformedResponse { message });
                }
            }
        }
    }

    /// Offline page for the query; never cached so a recovered pool is retried next time
    fn fallback_page(&self, query: &str, page: u32) -> Result<ResultPage, SearchError> {
        let collection = self.fallback.select(query);
        let items = collection.page(page, self.page_size);
        if items.is_empty() {
            return Err(SearchError::AllSourcesExhausted {
                query: query.to_string(),
            });
        }

        debug!(
            "Serving {} fallback result(s) from collection {}",
            items.len(),
            collection.name
        );
        let upstream_count = items.len();
        Ok(ResultPage {
            query: query.to_string(),
            page,
            items: ranking::rank(items, query),
            origin: PageOrigin::Fallback,
            stale: false,
            upstream_count,
        })
    }
}

impl Drop for SearchClient {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Map a provider image to the canonical result shape
pub fn map_provider_image(image: ProviderImage) -> ResultItem {
    let digest = Sha256::digest(normalize_image_location(&image.image_location).as_bytes());
    ResultItem {
        id: hex::encode(&digest[..8]),
        title: image.title,
        image_location: image.image_location,
        author: image.display_origin,
        tags: BTreeSet::new(),
        source_location: image.context_location,
        is_generated: false,
        relevance_score: 0,
    }
}
