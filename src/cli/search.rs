// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use std::sync::Arc;
use tracing::info;

use crate::search::{PaginatedSearch, SearchClient, SearchConfig, SessionPhase, SessionSnapshot};

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Natural-language query
    pub query: String,

    /// Number of pages to load (bounded by SEARCH_MAX_PAGES)
    #[arg(long, default_value_t = 1)]
    pub pages: u32,

    /// Print the session snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the pool status as JSON
    #[arg(long)]
    pub json: bool,
}

fn build_session(config: &SearchConfig) -> Result<PaginatedSearch> {
    let client = SearchClient::from_config(config).map_err(|e| anyhow!(e))?;
    Ok(PaginatedSearch::new(Arc::new(client), config))
}

/// Run a search and print the accumulated results
pub async fn run_search(args: SearchArgs) -> Result<()> {
    let config = SearchConfig::from_env();
    let session = build_session(&config)?;

    let mut snapshot = session.search(&args.query).await;
    while snapshot.pages_fetched < args.pages && snapshot.has_more {
        snapshot = session.load_more().await;
    }
    let cache = session.cache_stats();
    info!(
        "Loaded {} result(s) over {} page(s), {} cached page(s)",
        snapshot.results.len(),
        snapshot.pages_fetched,
        cache.total
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }

    if snapshot.phase == SessionPhase::Error {
        return Err(anyhow!(snapshot.error.unwrap_or_else(|| "search failed".to_string())));
    }

    let status = session.pool_status();
    if status.available_credentials == 0 && status.total_credentials > 0 {
        eprintln!("⚠️  Search quota reached on every key; showing offline results");
    }
    Ok(())
}

/// Print the credential pool health
pub async fn show_status(args: StatusArgs) -> Result<()> {
    let config = SearchConfig::from_env();
    let session = build_session(&config)?;
    let status = session.pool_status();

    if !config.has_credentials() {
        eprintln!("⚠️  No API keys configured; searches use offline results only");
    }
    let cache = session.cache_stats();
    if args.json {
        let report = serde_json::json!({ "pool": status, "cache": cache });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Credentials: {}/{} available", status.available_credentials, status.total_credentials);
    println!("Health:      {:?}", status.health);
    println!("Usage:       {}", status.total_usage);
    println!("Cache:       {}/{} page(s), {} expired", cache.total, cache.max, cache.expired);
    if let Some(hint) = status.next_credential_hint {
        println!("Next key:    {}", hint);
    }
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    if snapshot.results.is_empty() {
        println!("No results for \"{}\"", snapshot.query);
        return;
    }

    let origin = snapshot
        .last_origin
        .map(|o| format!("{:?}", o))
        .unwrap_or_default();
    println!(
        "{} result(s) for \"{}\" ({}{})",
        snapshot.results.len(),
        snapshot.query,
        origin,
        if snapshot.stale { ", stale" } else { "" }
    );
    for (i, item) in snapshot.results.iter().enumerate() {
        println!("{:>3}. [{:>2}] {}", i + 1, item.relevance_score, item.title);
        println!("          {}", item.image_location);
    }
    if snapshot.has_more {
        println!("… more results available");
    }
}
