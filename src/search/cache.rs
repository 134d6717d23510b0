// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TTL-based result page caching
//!
//! Pages are keyed by (normalized query, page number) and stored as JSON in a
//! [`KeyValueStore`]. Fresh entries are served directly; expired entries stay
//! readable through [`ResultCache::get_stale`] until they pass the retention
//! window, after which they are never served and the sweep deletes them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::KeyValueStore;
use super::types::{normalize_query, ResultItem, ResultPage};

const KEY_PREFIX: &str = "search_cache:";

/// A cached result page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub query: String,
    pub page: u32,
    pub results: Vec<ResultItem>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: i64,
    /// Items the provider returned before filtering
    #[serde(default)]
    pub upstream_count: usize,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < Duration::seconds(self.ttl_secs)
    }

    /// Upstream page length, never less than what was kept
    pub fn upstream_len(&self) -> usize {
        self.upstream_count.max(self.results.len())
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Total entries in cache
    pub total: usize,
    /// Expired entries (not yet swept)
    pub expired: usize,
    /// Maximum cache capacity
    pub max: usize,
}

/// Result cache over a session store
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    retention: Duration,
    max_entries: usize,
}

impl ResultCache {
    /// Create a new result cache
    ///
    /// # Arguments
    /// * `store` - Backing key-value store
    /// * `ttl_secs` - How long an entry counts as fresh
    /// * `retention_secs` - Age after which the sweep deletes an entry
    /// * `max_entries` - Maximum number of entries to keep
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        ttl_secs: u64,
        retention_secs: u64,
        max_entries: usize,
    ) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs as i64),
            retention: Duration::seconds(retention_secs as i64),
            max_entries,
        }
    }

    /// Fresh entry for (query, page), if any
    pub fn get(&self, query: &str, page: u32) -> Option<CacheEntry> {
        self.get_at(query, page, Utc::now())
    }

    pub fn get_at(&self, query: &str, page: u32, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.get_stale_at(query, page, now).filter(|e| e.is_fresh(now))
    }

    /// Entry for (query, page) past its TTL but still inside the retention window
    pub fn get_stale(&self, query: &str, page: u32) -> Option<CacheEntry> {
        self.get_stale_at(query, page, Utc::now())
    }

    pub fn get_stale_at(&self, query: &str, page: u32, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.read(&Self::cache_key(query, page))
            .filter(|e| now - e.created_at < self.retention)
    }

    /// Store a live result page
    pub fn put_page(&self, page: &ResultPage) {
        self.store_entry(&page.query, page.page, &page.items, page.upstream_count, Utc::now());
    }

    /// Store results as a full upstream page created at `now`
    pub fn put_at(&self, query: &str, page: u32, results: &[ResultItem], now: DateTime<Utc>) {
        self.store_entry(query, page, results, results.len(), now);
    }

    fn store_entry(
        &self,
        query: &str,
        page: u32,
        results: &[ResultItem],
        upstream_count: usize,
        now: DateTime<Utc>,
    ) {
        let key = Self::cache_key(query, page);
        let entry = CacheEntry {
            query: normalize_query(query),
            page,
            results: results.to_vec(),
            created_at: now,
            ttl_secs: self.ttl.num_seconds(),
            upstream_count,
        };

        match serde_json::to_string(&entry) {
            Ok(json) => self.store.set(&key, json),
            Err(e) => {
                warn!("Failed to serialize cache entry: {}", e);
                return;
            }
        }

        self.evict_over_capacity();
    }

    /// Delete entries older than the retention window; returns how many were removed
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for key in self.store.keys(KEY_PREFIX) {
            let expired = match self.read(&key) {
                Some(entry) => now - entry.created_at >= self.retention,
                None => true,
            };
            if expired {
                self.store.delete(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Cache sweep removed {} entr(ies)", removed);
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current tokio runtime
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep(Utc::now());
            }
        })
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let entries: Vec<CacheEntry> = self
            .store
            .keys(KEY_PREFIX)
            .iter()
            .filter_map(|k| self.read(k))
            .collect();

        CacheStats {
            total: entries.len(),
            expired: entries.iter().filter(|e| !e.is_fresh(now)).count(),
            max: self.max_entries,
        }
    }

    /// Generate cache key from query and page
    fn cache_key(query: &str, page: u32) -> String {
        format!("{}{}:{}", KEY_PREFIX, normalize_query(query), page)
    }

    fn read(&self, key: &str) -> Option<CacheEntry> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Dropping unreadable cache entry: {}", e);
                self.store.delete(key);
                None
            }
        }
    }

    /// Evict oldest entries until the cache fits its capacity
    fn evict_over_capacity(&self) {
        let keys = self.store.keys(KEY_PREFIX);
        if keys.len() <= self.max_entries {
            return;
        }

        let mut aged: Vec<(DateTime<Utc>, String)> = keys
            .into_iter()
            .map(|k| {
                let created = self
                    .read(&k)
                    .map(|e| e.created_at)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                (created, k)
            })
            .collect();
        aged.sort();

        let excess = aged.len() - self.max_entries;
        for (_, key) in aged.into_iter().take(excess) {
            self.store.delete(&key);
        }
        debug!("Evicted {} oldest cache entr(ies)", excess);
    }
}
