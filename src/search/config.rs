// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for diagram image search

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the search client and pagination layer
#[derive(Clone)]
pub struct SearchConfig {
    /// Provider API keys, in rotation order
    pub api_keys: Vec<String>,
    /// Programmable Search Engine id
    pub engine_id: String,
    /// Results requested per page
    pub page_size: usize,
    /// Maximum upstream pages fetched per session
    pub max_pages: u32,
    /// Maximum results accumulated per session
    pub max_results: usize,
    /// Seconds a cached page counts as fresh
    pub cache_ttl_secs: u64,
    /// Seconds before the sweep deletes a cached page
    pub cache_retention_secs: u64,
    /// Maximum cached pages
    pub cache_max_entries: usize,
    /// Seconds between background cache sweeps
    pub cache_sweep_interval_secs: u64,
    /// Seconds a failed credential stays out of rotation
    pub credential_cooldown_secs: u64,
    /// Outbound provider calls per minute
    pub rate_limit_per_minute: u32,
    /// Provider request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Delay before retrying a credential after a transient failure
    pub transient_retry_delay_ms: u64,
}

impl SearchConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_keys: env::var("IMAGE_SEARCH_API_KEYS")
                .map(|v| parse_key_list(&v))
                .unwrap_or_default(),
            engine_id: env::var("IMAGE_SEARCH_ENGINE_ID").unwrap_or_default(),
            page_size: env_or("SEARCH_PAGE_SIZE", defaults.page_size),
            max_pages: env_or("SEARCH_MAX_PAGES", defaults.max_pages),
            max_results: env_or("SEARCH_MAX_RESULTS", defaults.max_results),
            cache_ttl_secs: env_or("SEARCH_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            cache_retention_secs: env_or(
                "SEARCH_CACHE_RETENTION_SECS",
                defaults.cache_retention_secs,
            ),
            cache_max_entries: env_or("SEARCH_CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            cache_sweep_interval_secs: env_or(
                "SEARCH_CACHE_SWEEP_SECS",
                defaults.cache_sweep_interval_secs,
            ),
            credential_cooldown_secs: env_or(
                "CREDENTIAL_COOLDOWN_SECS",
                defaults.credential_cooldown_secs,
            ),
            rate_limit_per_minute: env_or(
                "SEARCH_RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            ),
            request_timeout_ms: env_or("SEARCH_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            transient_retry_delay_ms: env_or(
                "TRANSIENT_RETRY_DELAY_MS",
                defaults.transient_retry_delay_ms,
            ),
        }
    }

    /// Validate the configuration
    ///
    /// An empty key list is valid: every request is then served from the
    /// fallback collections.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("Page size must be greater than 0".to_string());
        }
        if self.max_pages == 0 {
            return Err("Max pages must be greater than 0".to_string());
        }
        if self.max_results < self.page_size {
            return Err("Max results must be at least one page".to_string());
        }
        if self.cache_ttl_secs == 0 {
            return Err("Cache TTL must be greater than 0".to_string());
        }
        if self.cache_retention_secs < self.cache_ttl_secs {
            return Err("Cache retention must not be shorter than the TTL".to_string());
        }
        if self.cache_max_entries == 0 {
            return Err("Cache capacity must be greater than 0".to_string());
        }
        if self.cache_sweep_interval_secs == 0 {
            return Err("Cache sweep interval must be greater than 0".to_string());
        }
        if self.rate_limit_per_minute == 0 {
            return Err("Rate limit must be greater than 0".to_string());
        }
        if !self.api_keys.is_empty() && self.engine_id.is_empty() {
            return Err("IMAGE_SEARCH_ENGINE_ID is required when API keys are set".to_string());
        }
        Ok(())
    }

    /// Check if any live credential is configured
    pub fn has_credentials(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn credential_cooldown(&self) -> Duration {
        Duration::from_secs(self.credential_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn transient_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transient_retry_delay_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            engine_id: String::new(),
            page_size: 10,
            max_pages: 5,
            max_results: 30,
            cache_ttl_secs: 1800,
            cache_retention_secs: 3600,
            cache_max_entries: 200,
            cache_sweep_interval_secs: 300,
            credential_cooldown_secs: 300,
            rate_limit_per_minute: 60,
            request_timeout_ms: 10000,
            transient_retry_delay_ms: 500,
        }
    }
}

// Keys are secrets, so Debug shows only how many there are
impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_keys", &format!("<{} key(s)>", self.api_keys.len()))
            .field("engine_id", &self.engine_id)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("max_results", &self.max_results)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_retention_secs", &self.cache_retention_secs)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("cache_sweep_interval_secs", &self.cache_sweep_interval_secs)
            .field("credential_cooldown_secs", &self.credential_cooldown_secs)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("transient_retry_delay_ms", &self.transient_retry_delay_ms)
            .finish()
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
