// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image search provider trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::types::normalize_image_location;

/// One image as returned by a provider, before mapping to `ResultItem`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderImage {
    pub title: String,
    /// Direct URL of the image
    pub image_location: String,
    /// Page the image appears on
    pub context_location: Option<String>,
    /// Human-readable origin, usually the site's domain
    pub display_origin: Option<String>,
}

impl ProviderImage {
    /// Animated GIFs are not usable as diagrams
    pub fn is_animated(&self) -> bool {
        normalize_image_location(&self.image_location)
            .to_lowercase()
            .ends_with(".gif")
    }
}

/// Parameters for a single provider call
#[derive(Clone)]
pub struct ProviderRequest {
    pub query: String,
    /// Credential secret; never logged
    pub api_key: String,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("query", &self.query)
            .field("api_key", &"<redacted>")
            .field("page", &self.page)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Provider failure, classified by how the client should react
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Quota, rate limit or authorization failure tied to the credential
    #[error("Quota exceeded (status {status}): {message}")]
    QuotaExceeded { status: u16, message: String },

    /// The credential itself was rejected as invalid
    #[error("Credential rejected: {message}")]
    InvalidCredential { message: String },

    /// Connection, timeout or server-side failure
    #[error("Transient error (status {status}): {message}")]
    Transient { status: u16, message: String },

    /// Response body could not be understood
    #[error("Malformed response: {message}")]
    Malformed { message: String },
}

impl ProviderError {
    /// Classify a non-success HTTP response
    ///
    /// Anything not recognised as transient or invalid-key is treated as a
    /// quota failure so the client rotates credentials.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 200);
        match status {
            400 if is_invalid_key_body(body) => ProviderError::InvalidCredential { message },
            408 | 500 | 502 | 503 | 504 => ProviderError::Transient { status, message },
            _ => ProviderError::QuotaExceeded { status, message },
        }
    }
}

fn is_invalid_key_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("api key not valid") || lower.contains("keyinvalid")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Trait for implementing image search providers
#[async_trait]
pub trait ImageSearchProvider: Send + Sync {
    /// Fetch one page of images
    ///
    /// # Arguments
    /// * `request` - Query, credential and paging parameters
    ///
    /// # Returns
    /// Images in provider order, or a classified error
    async fn search_images(
        &self,
        request: &ProviderRequest,
    ) -> Result<Vec<ProviderImage>, ProviderError>;

    /// Get the provider name for logging
    fn name(&self) -> &'static str;

    /// Largest page the provider can return in one call, if bounded
    fn max_page_size(&self) -> Option<usize> {
        None
    }
}
