// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod search;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Diagram search CLI
#[derive(Parser, Debug)]
#[command(name = "diagram-search")]
#[command(version)]
#[command(about = "Search diagram images with credential rotation and offline fallback", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for diagram images
    Search(search::SearchArgs),

    /// Show credential pool health
    Status(search::StatusArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search(args) => search::run_search(args).await,
        Commands::Status(args) => search::show_status(args).await,
    }
}
