//! Collector CLI - pre-fetches the province boundaries
//!
//! Usage:
//!   # Local files first, then remote, with default sources:
//!   cargo run --bin monitor-collector
//!
//!   # Custom sources:
//!   cargo run --bin monitor-collector -- --config config/boundaries.json
//!
//!   # Ignore local files and download again:
//!   cargo run --bin monitor-collector -- --force

use anyhow::{Context, Result};
use clap::Parser;
use monitor_collector::{BoundaryLoader, BoundaryOrigin, BoundarySourcesConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "monitor-collector", about = "Fetches and caches province boundaries")]
struct Args {
    /// Path to boundary sources config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-download even if a local copy exists
    #[arg(long, default_value = "false")]
    force: bool,
}

fn print_sources(config: &BoundarySourcesConfig) {
    println!("\nConfigured sources:");
    println!("{:-<60}", "");
    for path in &config.local_paths {
        let mark = if path.exists() { "✓" } else { "✗" };
        println!("  {} local  {}", mark, path.display());
    }
    for url in &config.remote_urls {
        println!("  · remote {}", url);
    }
    println!("{:-<60}", "");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            println!("Loading sources from: {}", path.display());
            BoundarySourcesConfig::load(path).await?
        }
        None => BoundarySourcesConfig::from_env().await?,
    };

    println!("=== Monitor Provincial Collector ===");
    println!("Cache: {}", config.cache_path.display());
    println!("Timeout: {}s", config.timeout_secs);
    println!("Mode: {}", if args.force { "force download" } else { "local first" });
    print_sources(&config);

    let loader = BoundaryLoader::new(config).context("Failed to build HTTP client")?;
    let result = if args.force {
        loader.refresh().await
    } else {
        loader.load().await
    };
    let loaded = result.context("Could not obtain province boundaries")?;

    println!("\n=== Collection Summary ===");
    match &loaded.origin {
        BoundaryOrigin::Local(path) => println!("Source: local {}", path.display()),
        BoundaryOrigin::Remote(url) => {
            println!("Source: {}", url);
            println!("Cached to: {}", loader.config().cache_path.display());
        }
    }
    println!("Loaded at: {}", loaded.loaded_at.to_rfc3339());
    println!("Features: {}", loaded.set.len());
    println!("Size: {} bytes", loaded.size_bytes);
    println!("Hash: {}", loaded.content_hash);
    println!("Id property: {}", loaded.set.feature_id_key());

    Ok(())
}
