// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Shared helpers for search integration tests

use async_trait::async_trait;
use diagram_search::search::{
    ImageSearchProvider, MemoryStore, PaginatedSearch, ProviderError, ProviderImage,
    ProviderRequest, SearchClient, SearchConfig,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub type Reply = Result<Vec<ProviderImage>, ProviderError>;

/// Plays back queued replies, then serves generated pages
pub struct ScriptedProvider {
    queued: Mutex<VecDeque<Reply>>,
    per_page: usize,
    requests: Mutex<Vec<(String, u32)>>,
}

impl ScriptedProvider {
    pub fn new(queued: Vec<Reply>, per_page: usize) -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(queued.into()),
            per_page,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// (api key, page) of every call, in order
    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSearchProvider for ScriptedProvider {
    async fn search_images(&self, request: &ProviderRequest) -> Reply {
        self.requests
            .lock()
            .unwrap()
            .push((request.api_key.clone(), request.page));

        if let Some(reply) = self.queued.lock().unwrap().pop_front() {
            return reply;
        }
        Ok(page_of(&request.query, request.page, self.per_page))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// `n` distinct images for a query page
pub fn page_of(query: &str, page: u32, n: usize) -> Vec<ProviderImage> {
    (0..n)
        .map(|i| image(&format!("{query} result {page}-{i}"), &format!(
            "https://img.example.com/{}/{}-{}.png",
            query.replace(' ', "-"),
            page,
            i
        )))
        .collect()
}

pub fn image(title: &str, url: &str) -> ProviderImage {
    ProviderImage {
        title: title.to_string(),
        image_location: url.to_string(),
        context_location: Some("https://example.com/article".to_string()),
        display_origin: Some("example.com".to_string()),
    }
}

pub fn quota() -> Reply {
    Err(ProviderError::QuotaExceeded {
        status: 429,
        message: "rateLimitExceeded".to_string(),
    })
}

pub fn config(keys: &[&str]) -> SearchConfig {
    SearchConfig {
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        engine_id: "test-engine".to_string(),
        rate_limit_per_minute: 10_000,
        transient_retry_delay_ms: 1,
        ..SearchConfig::default()
    }
}

pub fn client(keys: &[&str], provider: Arc<ScriptedProvider>) -> Arc<SearchClient> {
    Arc::new(SearchClient::new(
        &config(keys),
        provider,
        Arc::new(MemoryStore::new()),
    ))
}

pub fn session(keys: &[&str], provider: Arc<ScriptedProvider>) -> PaginatedSearch {
    PaginatedSearch::new(client(keys, provider), &config(keys))
}
