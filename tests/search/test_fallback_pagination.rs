// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Offline fallback paging

use super::common::{session, ScriptedProvider};
use diagram_search::search::fallback::FallbackProvider;
use diagram_search::search::{PageOrigin, SessionPhase};
use std::collections::HashSet;

#[test]
fn test_fallback_pages_cycle_through_collection() {
    let fallback = FallbackProvider::new();
    let collection = fallback.select("network topology");
    let size = collection.len();

    let first = fallback.page_for("network topology", 1, 10);
    assert_eq!(first.len(), 10.min(size));

    // Page after the end of the collection starts over
    let pages_per_cycle = (size / 10) as u32;
    let wrapped = fallback.page_for("network topology", pages_per_cycle + 1, 10);
    assert_eq!(wrapped, first);
}

#[test]
fn test_unmatched_query_gets_stable_mix() {
    let fallback = FallbackProvider::new();
    let a = fallback.page_for("quantum basket weaving", 1, 10);
    let b = fallback.page_for("Quantum  Basket Weaving", 1, 10);

    assert_eq!(a.len(), 10);
    assert_eq!(a, b);
    assert!(a.iter().all(|item| item.is_fallback()));
}

#[tokio::test]
async fn test_offline_session_ends_exhausted() {
    let provider = ScriptedProvider::new(vec![], 10);
    let session = session(&[], provider);

    let mut snapshot = session.search("flowchart").await;
    assert_eq!(snapshot.last_origin, Some(PageOrigin::Fallback));
    while snapshot.has_more {
        snapshot = session.load_more().await;
    }

    // Ten distinct templates, so the second page repeats and adds nothing
    assert_eq!(snapshot.phase, SessionPhase::Exhausted);
    assert!(!snapshot.has_more);
    let unique: HashSet<_> = snapshot.results.iter().map(|r| r.id.clone()).collect();
    assert_eq!(unique.len(), snapshot.results.len());
    assert_eq!(snapshot.results.len(), 10);
}
