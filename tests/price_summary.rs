//! Tests for the cache-first batch price summary.

use async_trait::async_trait;
use nft_listing_cache::listing::{ListingCache, ListingError, ListingSource, PriceSummaryService};
use nft_listing_cache::types::{
    sol_to_lamports, ListingQueryResult, ListingRecord, Mint, MAGIC_EDEN_MARKETPLACE,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Every even-numbered mint is listed at `index` SOL; odd ones are unlisted.
/// Mints containing "Slow" never answer within a test deadline.
struct CollectionUpstream {
    calls: AtomicUsize,
}

impl CollectionUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn listing_for(mint: &str, price: f64) -> ListingRecord {
    ListingRecord {
        id: format!("{}Pda", mint),
        price,
        price_minor_units: sol_to_lamports(price),
        seller: "MadLadsSeller1111".to_string(),
        token_mint: mint.to_string(),
        token_address: format!("{}Ata", mint),
        marketplace_id: MAGIC_EDEN_MARKETPLACE.to_string(),
        auction_house: None,
        expiry: 0,
    }
}

#[async_trait]
impl ListingSource for CollectionUpstream {
    async fn fetch_listings(&self, mint: &str) -> Result<ListingQueryResult, ListingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if mint.contains("Slow") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        let index: usize = mint
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .unwrap_or(1);
        if index % 2 == 0 {
            Ok(ListingQueryResult::new(mint, vec![listing_for(mint, index as f64)]))
        } else {
            Ok(ListingQueryResult::unlisted(mint))
        }
    }
}

fn mad_lads(count: usize) -> Vec<Mint> {
    (0..count).map(|i| format!("MadLad{}", i)).collect()
}

#[tokio::test]
async fn test_only_cache_misses_go_upstream() {
    let upstream = CollectionUpstream::new();
    let cache = Arc::new(ListingCache::with_default_ttl(Duration::from_secs(600)));
    let service =
        PriceSummaryService::new(cache.clone(), upstream.clone(), Duration::from_secs(10));

    let mints = mad_lads(30);
    for mint in mints.iter().take(10) {
        cache.set(mint.clone(), ListingQueryResult::unlisted(mint.clone()));
    }

    let summary = service.summarize(&mints).await;

    assert_eq!(upstream.calls(), 20);
    assert_eq!(summary.total, 30);
    assert_eq!(summary.checked, 30);
    assert_eq!(summary.cache_performance.hits, 10);
    assert_eq!(summary.cache_performance.misses, 20);
    assert!((summary.cache_performance.hit_rate - 1.0 / 3.0).abs() < 1e-9);

    // MadLad10..=29: the even ones are listed
    assert_eq!(summary.listed, 10);
    assert_eq!(summary.unlisted, 20);
    let range = summary.price_range.expect("listed mints should yield a price range");
    assert_eq!(range.min, 10.0);
    assert_eq!(range.max, 28.0);

    // Fetched results were cached: a second summary is served entirely from cache
    let again = service.summarize(&mints).await;
    assert_eq!(upstream.calls(), 20);
    assert_eq!(again.cache_performance.hits, 30);
    assert_eq!(again.listed, 10);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_abandons_slow_lookups() {
    let upstream = CollectionUpstream::new();
    let cache = Arc::new(ListingCache::with_default_ttl(Duration::from_secs(600)));
    let service =
        PriceSummaryService::new(cache.clone(), upstream.clone(), Duration::from_secs(10));

    let mints = vec!["Fast2".to_string(), "Slow4".to_string(), "Fast3".to_string()];
    let summary = service.summarize(&mints).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.listed, 1);
    assert_eq!(summary.unlisted, 1);
    assert_eq!(summary.listings[0].mint, "Fast2");
    // Abandoned lookups are not cached
    assert!(cache.get("Slow4").is_none());
    assert!(cache.get("Fast2").is_some());
}

#[tokio::test]
async fn test_repeated_mints_are_fetched_once() {
    let upstream = CollectionUpstream::new();
    let cache = Arc::new(ListingCache::with_default_ttl(Duration::from_secs(600)));
    let service =
        PriceSummaryService::new(cache.clone(), upstream.clone(), Duration::from_secs(10));

    let mints: Vec<Mint> = ["MadLad2", "MadLad3", "MadLad2", "MadLad2"]
        .iter()
        .map(|m| m.to_string())
        .collect();
    let summary = service.summarize(&mints).await;

    assert_eq!(upstream.calls(), 2);
    assert_eq!(summary.cache_performance.misses, 2);
    assert_eq!(summary.cache_performance.hits, 0);
    assert_eq!(summary.total, 4);
}
