// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// End-to-end tests for paginated search sessions

use super::common::{client, config, image, page_of, quota, session, ScriptedProvider};
use chrono::{Duration, Utc};
use diagram_search::search::{PageOrigin, PaginatedSearch, PoolHealth, SessionPhase};

#[tokio::test]
async fn test_quota_on_first_key_rotates_to_second() {
    let provider = ScriptedProvider::new(vec![quota(), Ok(page_of("network diagram", 1, 10))], 10);
    let session = session(&["k1", "k2"], provider.clone());

    let snapshot = session.search("network diagram").await;

    assert_eq!(snapshot.phase, SessionPhase::Loaded);
    assert_eq!(snapshot.results.len(), 10);
    assert!(snapshot.has_more);
    assert_eq!(snapshot.last_origin, Some(PageOrigin::Live));

    let status = session.pool_status();
    assert_eq!(status.total_credentials, 2);
    assert_eq!(status.available_credentials, 1);
    assert_eq!(status.health, PoolHealth::Warning);

    let keys: Vec<String> = provider.requests().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["k1", "k2"]);
}

#[tokio::test]
async fn test_repeat_search_served_from_cache() {
    let provider = ScriptedProvider::new(vec![], 10);
    let session = session(&["k1"], provider.clone());

    let first = session.search("Network   Diagram").await;
    assert_eq!(provider.calls(), 1);

    let second = session.search("network diagram").await;
    assert_eq!(provider.calls(), 1);
    assert_eq!(second.last_origin, Some(PageOrigin::Cache));
    assert_eq!(second.results, first.results);
}

#[tokio::test]
async fn test_duplicate_locations_merged_across_pages() {
    let mut first = page_of("uml", 1, 9);
    first.push(image("Class Diagram", "https://img.example.com/x.png?a=1"));
    let mut second = page_of("uml", 2, 9);
    second.push(image("Class Diagram Copy", "https://img.example.com/x.png?a=2"));

    let provider = ScriptedProvider::new(vec![Ok(first), Ok(second)], 10);
    let session = session(&["k1"], provider);

    session.search("uml").await;
    let snapshot = session.load_more().await;

    assert_eq!(snapshot.pages_fetched, 2);
    assert_eq!(snapshot.results.len(), 19);
    let copies = snapshot
        .results
        .iter()
        .filter(|r| r.normalized_location() == "https://img.example.com/x.png")
        .count();
    assert_eq!(copies, 1);
}

#[tokio::test]
async fn test_paging_stops_at_result_ceiling() {
    let provider = ScriptedProvider::new(vec![], 10);
    let session = session(&["k1"], provider.clone());

    let mut snapshot = session.search("architecture diagram").await;
    while snapshot.has_more {
        snapshot = session.load_more().await;
    }

    assert_eq!(snapshot.results.len(), 30);
    assert_eq!(snapshot.pages_fetched, 3);
    assert_eq!(snapshot.phase, SessionPhase::Loaded);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_pool_prefers_stale_cache() {
    let provider = ScriptedProvider::new(vec![Ok(page_of("er diagram", 1, 10)), quota()], 10);
    let client = client(&["k1"], provider.clone());
    let session = PaginatedSearch::new(client.clone(), &config(&["k1"]));

    let live = session.search("er diagram").await;
    assert_eq!(live.last_origin, Some(PageOrigin::Live));

    // Age the entry past its TTL
    let long_ago = Utc::now() - Duration::seconds(2000);
    client.cache().put_at("er diagram", 1, &live.results, long_ago);

    let degraded = session.search("er diagram").await;
    assert_eq!(degraded.phase, SessionPhase::Loaded);
    assert_eq!(degraded.last_origin, Some(PageOrigin::StaleCache));
    assert!(degraded.stale);
    assert_eq!(degraded.results, live.results);
    assert_eq!(session.pool_status().health, PoolHealth::Critical);
}

#[tokio::test]
async fn test_no_credentials_serves_fallback() {
    let provider = ScriptedProvider::new(vec![], 10);
    let session = session(&[], provider.clone());

    let snapshot = session.search("network topology").await;

    assert_eq!(provider.calls(), 0);
    assert_eq!(snapshot.last_origin, Some(PageOrigin::Fallback));
    assert_eq!(snapshot.results.len(), 10);
    assert!(snapshot.results.iter().all(|r| r.is_fallback()));
}

#[tokio::test]
async fn test_full_page_with_animated_image_keeps_paging() {
    let mut first = page_of("network", 1, 9);
    first.push(image("Loading Spinner", "https://img.example.com/spinner.gif"));
    let provider = ScriptedProvider::new(vec![Ok(first)], 10);
    let session = session(&["k1"], provider);

    let snapshot = session.search("network").await;
    assert_eq!(snapshot.results.len(), 9);
    assert!(snapshot.has_more);

    let more = session.load_more().await;
    assert_eq!(more.pages_fetched, 2);
    assert_eq!(more.results.len(), 19);
}
