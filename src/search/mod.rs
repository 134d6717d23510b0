// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Resilient diagram image search
//!
//! Queries a quota-bounded image search API through a pool of credentials,
//! caches ranked result pages, and degrades to offline content when no
//! credential is usable.
//!
//! Key features:
//! - Credential rotation with per-key cooldowns
//! - TTL-based page caching over a pluggable session store
//! - Deterministic, topic-keyed fallback collections
//! - Relevance ranking and cross-page deduplication
//! - Paginated sessions with hard page and result ceilings

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod fallback;
pub mod google;
pub mod provider;
pub mod ranking;
pub mod rate_limiter;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, ResultCache};
pub use client::SearchClient;
pub use config::SearchConfig;
pub use credentials::{CredentialPool, FailureKind, PoolHealth, PoolStatus};
pub use provider::{ImageSearchProvider, ProviderError, ProviderImage, ProviderRequest};
pub use session::{PaginatedSearch, SessionPhase, SessionSnapshot};
pub use store::{KeyValueStore, MemoryStore};
pub use types::{PageOrigin, ResultItem, ResultPage, SearchError};
