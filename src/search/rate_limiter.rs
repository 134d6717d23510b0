// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Outbound rate limiting for provider calls

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;

const DEFAULT_REQUESTS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(60) {
    Some(v) => v,
    None => unreachable!(),
};

/// Paces calls to the image search provider across all sessions
pub struct ProviderRateLimiter {
    limiter: GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    requests_per_minute: u32,
}

impl ProviderRateLimiter {
    /// Create a new rate limiter; zero falls back to 60 requests per minute
    pub fn new(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
        let limiter = GovRateLimiter::direct(Quota::per_minute(rpm));

        Self {
            limiter,
            requests_per_minute: rpm.get(),
        }
    }

    /// Wait until the quota allows another call
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Get the configured requests per minute
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}
