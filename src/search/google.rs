// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Google Custom Search image provider
//!
//! Queries the Custom Search JSON API with `searchType=image`. The response
//! parser also understands the SerpApi `google_images` shape, so a SerpApi
//! compatible proxy can sit behind the same endpoint setting.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{ImageSearchProvider, ProviderError, ProviderImage, ProviderRequest};

pub const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// The Custom Search API returns at most 10 items per call
const MAX_PAGE_SIZE: u32 = 10;

/// Google Custom Search image provider
pub struct GoogleImageProvider {
    engine_id: String,
    endpoint: String,
    client: Client,
}

impl GoogleImageProvider {
    /// Create a new provider
    ///
    /// # Arguments
    /// * `engine_id` - Programmable Search Engine id (`cx`)
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(engine_id: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            engine_id,
            endpoint: GOOGLE_CSE_URL.to_string(),
            client,
        })
    }

    /// Point the provider at a different endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Query parameters for a request, excluding the key
    fn query_params(&self, request: &ProviderRequest) -> Vec<(&'static str, String)> {
        let num = request.page_size.clamp(1, MAX_PAGE_SIZE);
        let start = (request.page.max(1) - 1) * num + 1;
        vec![
            ("cx", self.engine_id.clone()),
            ("q", request.query.clone()),
            ("searchType", "image".to_string()),
            ("num", num.to_string()),
            ("start", start.to_string()),
            ("safe", "active".to_string()),
        ]
    }
}

#[async_trait]
impl ImageSearchProvider for GoogleImageProvider {
    async fn search_images(
        &self,
        request: &ProviderRequest,
    ) -> Result<Vec<ProviderImage>, ProviderError> {
        let params = self.query_params(request);
        debug!(
            "Custom Search request: page {} ({} chars)",
            request.page,
            request.query.len()
        );

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .query(&params)
            .query(&[("key", request.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Transient {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.without_url().to_string()
                },
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transient {
            status: status.as_u16(),
            message: e.without_url().to_string(),
        })?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        parse_image_response(&body)
    }

    fn name(&self) -> &'static str {
        "google"
    }

    fn max_page_size(&self) -> Option<usize> {
        Some(MAX_PAGE_SIZE as usize)
    }
}

/// Union of the two response shapes we accept
#[derive(Debug, Deserialize)]
struct RawImageResponse {
    /// Custom Search shape
    items: Option<Vec<CseItem>>,
    /// SerpApi shape
    images_results: Option<Vec<SerpImage>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseItem {
    title: Option<String>,
    link: Option<String>,
    display_link: Option<String>,
    image: Option<CseImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseImage {
    context_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpImage {
    title: Option<String>,
    original: Option<String>,
    thumbnail: Option<String>,
    link: Option<String>,
    source: Option<String>,
}

/// Parse a successful response body from either supported shape
///
/// A body without any result list is a valid empty page. Entries without an
/// image URL are dropped; everything else is returned so the caller sees how
/// full the upstream page was.
pub fn parse_image_response(body: &str) -> Result<Vec<ProviderImage>, ProviderError> {
    let raw: RawImageResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed {
            message: e.to_string(),
        })?;

    if let Some(error) = raw.error {
        return Err(ProviderError::QuotaExceeded {
            status: 200,
            message: error.to_string().chars().take(200).collect(),
        });
    }

    let images = if let Some(items) = raw.items {
        items
            .into_iter()
            .filter_map(|item| {
                Some(ProviderImage {
                    image_location: item.link?,
                    title: item.title.unwrap_or_default(),
                    context_location: item.image.and_then(|i| i.context_link),
                    display_origin: item.display_link,
                })
            })
            .collect()
    } else {
        raw.images_results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                Some(ProviderImage {
                    image_location: item.original.or(item.thumbnail)?,
                    title: item.title.unwrap_or_default(),
                    context_location: item.link,
                    display_origin: item.source,
                })
            })
            .collect()
    };

    Ok(images)
}
