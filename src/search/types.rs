// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for diagram image search

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A single image result, the canonical shape every source is mapped into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItem {
    /// Stable identifier (not used for deduplication)
    pub id: String,
    /// Title of the image
    pub title: String,
    /// URL of the image itself
    pub image_location: String,
    /// Author or originating site, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Descriptive tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Page the image was found on (`fallback://<collection>` for offline content)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
    /// Whether the image was produced by an image generator
    #[serde(default)]
    pub is_generated: bool,
    /// Score assigned by the ranker; cached pages keep the score they were ranked with
    #[serde(default)]
    pub relevance_score: u32,
}

impl ResultItem {
    /// Deduplication key: the image URL without query string or fragment
    pub fn normalized_location(&self) -> &str {
        normalize_image_location(&self.image_location)
    }

    /// Whether this item came from the offline fallback collections
    pub fn is_fallback(&self) -> bool {
        self.source_location
            .as_deref()
            .is_some_and(|s| s.starts_with(FALLBACK_SCHEME))
    }
}

/// URL scheme used to tag fallback items in `source_location`
pub const FALLBACK_SCHEME: &str = "fallback://";

/// Strip query string and fragment from an image URL
pub fn normalize_image_location(location: &str) -> &str {
    let end = location.find(['?', '#']).unwrap_or(location.len());
    &location[..end]
}

/// Case-fold and collapse whitespace in a query
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased alphanumeric tokens of `text`, first occurrence only
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Where a page of results came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageOrigin {
    /// Fetched from the image search provider
    Live,
    /// Fresh cache entry
    Cache,
    /// Expired cache entry served because no credential was usable
    StaleCache,
    /// Offline fallback collection
    Fallback,
}

/// One page of results as returned by the search client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    /// The query as submitted
    pub query: String,
    /// 1-based page number
    pub page: u32,
    /// Ranked items
    pub items: Vec<ResultItem>,
    /// Source of the items
    pub origin: PageOrigin,
    /// Set when the items are degraded output from an expired cache entry
    pub stale: bool,
    /// How many items the source returned before filtering; a full upstream
    /// page means more pages may follow even if some items were dropped
    pub upstream_count: usize,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Errors that can occur during search operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    /// Credential-specific quota or authorization failure
    #[error("Quota exceeded for credential {credential}")]
    QuotaExceeded {
        /// Redacted credential prefix
        credential: String,
    },

    /// Network failure that survived the same-credential retry
    #[error("Transient network error: {message}")]
    TransientNetwork {
        /// Error message
        message: String,
    },

    /// Provider answered with a body that could not be parsed
    #[error("Malformed provider response: {message}")]
    MalformedResponse {
        /// Parse error
        message: String,
    },

    /// Every credential is cooling or exhausted for this request
    #[error("Credential pool exhausted")]
    PoolExhausted,

    /// Pool exhausted and the fallback source produced nothing
    #[error("All search sources exhausted for query: {query}")]
    AllSourcesExhausted {
        /// The query that could not be served
        query: String,
    },

    /// Invalid search query
    #[error("Invalid query: {reason}")]
    InvalidQuery {
        /// Reason the query is invalid
        reason: String,
    },
}
