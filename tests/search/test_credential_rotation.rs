// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Credential pool behavior through the public API

use super::common::{client, quota, ScriptedProvider};
use chrono::{Duration, Utc};
use diagram_search::search::{CredentialPool, FailureKind, PageOrigin, PoolHealth};
use std::collections::HashSet;

#[test]
fn test_every_credential_tried_before_exhaustion() {
    let pool = CredentialPool::new(["a", "b", "c", "d"], std::time::Duration::from_secs(300));
    let now = Utc::now();
    let mut seen = HashSet::new();

    while let Some(lease) = pool.acquire_at(now) {
        assert!(seen.insert(lease.id().to_string()), "credential handed out twice");
        pool.report_failure_at(&lease, FailureKind::Quota, now);
    }

    assert_eq!(seen.len(), 4);
    let status = pool.status_at(now);
    assert_eq!(status.available_credentials, 0);
    assert_eq!(status.unavailable_credentials, 4);
    assert_eq!(status.health, PoolHealth::Critical);
}

#[test]
fn test_cooled_credentials_return_after_cooldown() {
    let pool = CredentialPool::new(["a", "b"], std::time::Duration::from_secs(300));
    let start = Utc::now();

    for _ in 0..2 {
        let lease = pool.acquire_at(start).unwrap();
        pool.report_failure_at(&lease, FailureKind::Quota, start);
    }
    assert!(pool.acquire_at(start + Duration::seconds(299)).is_none());

    let later = start + Duration::seconds(300);
    assert!(pool.acquire_at(later).is_some());
    assert_eq!(pool.status_at(later).available_credentials, 2);
}

#[tokio::test]
async fn test_concurrent_failures_never_undercount() {
    let provider = ScriptedProvider::new(vec![quota(), quota(), quota(), quota()], 10);
    let client = client(&["k1", "k2"], provider);

    let (a, b) = tokio::join!(
        client.fetch_page("flowchart", 1),
        client.fetch_page("flowchart", 2)
    );

    assert_eq!(a.unwrap().origin, PageOrigin::Fallback);
    assert_eq!(b.unwrap().origin, PageOrigin::Fallback);

    let status = client.pool_status();
    assert_eq!(status.available_credentials, 0);
    assert_eq!(status.unavailable_credentials, status.total_credentials);
}

#[tokio::test]
async fn test_reset_restores_whole_pool() {
    let provider = ScriptedProvider::new(vec![quota(), quota()], 10);
    let client = client(&["k1", "k2"], provider.clone());

    let page = client.fetch_page("process map", 1).await.unwrap();
    assert_eq!(page.origin, PageOrigin::Fallback);
    assert_eq!(client.pool_status().available_credentials, 0);

    let status = client.pool().reset_all();
    assert_eq!(status.available_credentials, 2);
    assert_eq!(status.health, PoolHealth::Healthy);

    let page = client.fetch_page("process map", 1).await.unwrap();
    assert_eq!(page.origin, PageOrigin::Live);
}
