// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Relevance ranking of result pages
//!
//! Scoring weights:
//! - full query in title: +3
//! - each query token in title: +1
//! - each query token equal to a tag: +2
//! - each intent keyword in the item, for intents detected in the query: +2
//!
//! Equal scores keep their input order.

use std::collections::BTreeSet;

use super::types::{normalize_query, tokenize, ResultItem};

const FULL_MATCH_WEIGHT: u32 = 3;
const TITLE_TOKEN_WEIGHT: u32 = 1;
const TAG_TOKEN_WEIGHT: u32 = 2;
const INTENT_KEYWORD_WEIGHT: u32 = 2;

/// Broad purpose behind a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Educational,
    Professional,
    Technical,
}

impl Intent {
    const ALL: [Intent; 3] = [Intent::Educational, Intent::Professional, Intent::Technical];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Intent::Educational => &[
                "education", "educational", "learning", "learn", "student", "students", "school",
                "classroom", "lesson", "teaching", "tutorial", "study", "course",
            ],
            Intent::Professional => &[
                "business", "professional", "corporate", "enterprise", "management", "strategy",
                "presentation", "report", "organization", "organizational", "marketing", "sales",
            ],
            Intent::Technical => &[
                "technical", "architecture", "system", "network", "database", "engineering",
                "software", "infrastructure", "server", "api", "circuit", "schema",
            ],
        }
    }
}

/// Intents whose keyword sets overlap the query tokens
pub fn detect_intents(query: &str) -> Vec<Intent> {
    let tokens: BTreeSet<String> = tokenize(query).into_iter().collect();
    Intent::ALL
        .into_iter()
        .filter(|intent| intent.keywords().iter().any(|k| tokens.contains(*k)))
        .collect()
}

/// Score one item against a query
pub fn score(item: &ResultItem, query: &str) -> u32 {
    score_with_intents(item, &normalize_query(query), &tokenize(query), &detect_intents(query))
}

/// Order results by descending relevance, keeping input order among ties
pub fn rank(mut results: Vec<ResultItem>, query: &str) -> Vec<ResultItem> {
    let normalized = normalize_query(query);
    let tokens = tokenize(query);
    let intents = detect_intents(query);

    for item in &mut results {
        item.relevance_score = score_with_intents(item, &normalized, &tokens, &intents);
    }
    // sort_by is stable
    results.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
    results
}

fn score_with_intents(
    item: &ResultItem,
    normalized_query: &str,
    tokens: &[String],
    intents: &[Intent],
) -> u32 {
    let title = normalize_query(&item.title);
    let title_tokens: BTreeSet<String> = tokenize(&item.title).into_iter().collect();
    let tags: Vec<String> = item.tags.iter().map(|t| t.to_lowercase()).collect();

    let mut score = 0;

    if !normalized_query.is_empty() && title.contains(normalized_query) {
        score += FULL_MATCH_WEIGHT;
    }

    for token in tokens {
        if title_tokens.contains(token) {
            score += TITLE_TOKEN_WEIGHT;
        }
        if tags.iter().any(|t| t == token) {
            score += TAG_TOKEN_WEIGHT;
        }
    }

    for intent in intents {
        for keyword in intent.keywords() {
            let in_title = title_tokens.contains(*keyword);
            let in_tags = tags.iter().any(|t| t == keyword);
            if in_title || in_tags {
                score += INTENT_KEYWORD_WEIGHT;
            }
        }
    }

    score
}
