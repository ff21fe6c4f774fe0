//! Client-side listing checker.
//!
//! Fires one lookup per mint at the same time, the way independent price
//! badges would, and lets the governor pace them toward the server.
//!
//! Usage: check_listings [--server <url>] <mint>...

use anyhow::{bail, Context, Result};
use nft_listing_cache::listing::{GovernorBuilder, ListingGovernor, ListingsRouteSource};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, Level};

const DEFAULT_SERVER: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let (server, mints) = parse_args(std::env::args().skip(1))?;

    let config = GovernorBuilder::new().build_config();
    let source = Arc::new(
        ListingsRouteSource::new(&server, config.request_timeout)
            .context("Failed to build HTTP client")?,
    );
    let governor = ListingGovernor::new(source, config);
    let _sweeper = governor.spawn_cache_sweeper(std::time::Duration::from_secs(60));

    info!("Checking {} mints against {}", mints.len(), server);

    let mut lookups = JoinSet::new();
    for mint in mints {
        let governor = governor.clone();
        lookups.spawn(async move {
            let result = governor.check_listing(&mint).await;
            (mint, result)
        });
    }

    while let Some(joined) = lookups.join_next().await {
        let (mint, result) = joined.context("Lookup task panicked")?;
        match result {
            Ok(listing) => match listing.best() {
                Some(best) => println!("{}  {:.4} SOL  (seller {})", mint, best.price, best.seller),
                None => println!("{}  unlisted", mint),
            },
            Err(e) => println!("{}  error: {}", mint, e),
        }
    }

    let status = governor.status().await;
    info!(
        "Governor status: queue={}, cached={}, processing={}",
        status.queue_length, status.cache_size, status.processing
    );
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(String, Vec<String>)> {
    let mut server = DEFAULT_SERVER.to_string();
    let mut mints = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--server" {
            server = args.next().context("--server needs a value")?;
        } else {
            mints.push(arg);
        }
    }

    if mints.is_empty() {
        bail!("usage: check_listings [--server <url>] <mint>...");
    }
    Ok((server, mints))
}
