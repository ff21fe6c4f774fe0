//! Shared server-side TTL cache for listing lookups.
//!
//! One instance absorbs repeated "listings for mint X" lookups across all
//! incoming requests so the marketplace API only sees the first one inside
//! the TTL window. Expired entries are evicted lazily on read and by an
//! optional periodic sweep owned by [`CacheSweeper`].

use crate::listing::config::CacheConfig;
use crate::listing::entry::CacheEntry;
use crate::types::{short_mint, ListingQueryResult, Mint};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Result of a batch lookup: cached results and the mints still to fetch.
#[derive(Debug, Clone, Default)]
pub struct BatchLookup {
    pub hits: HashMap<Mint, ListingQueryResult>,
    /// Cache misses, in input order
    pub misses: Vec<Mint>,
}

/// Per-entry diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStats {
    pub mint: String,
    /// Seconds since the entry was stored
    pub age: u64,
    /// Time to live in seconds
    pub ttl: u64,
    pub listing_count: usize,
}

/// Snapshot of the cache contents.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<EntryStats>,
}

/// Process-wide listing cache keyed by mint.
pub struct ListingCache {
    entries: DashMap<Mint, CacheEntry<ListingQueryResult>>,
    default_ttl: Duration,
}

impl ListingCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_default_ttl(config.default_ttl)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Look up a mint, evicting the entry if it has expired.
    pub fn get(&self, mint: &str) -> Option<ListingQueryResult> {
        let now = Instant::now();
        // remove_if holds the shard lock, so a concurrent set() that refreshed
        // the entry in the meantime is not thrown away
        if let Some((_, stale)) = self
            .entries
            .remove_if(mint, |_, entry| entry.is_expired_at(now))
        {
            debug!(
                "Expired entry for mint: {} (age: {}s)",
                short_mint(mint),
                stale.age_at(now).as_secs()
            );
            return None;
        }

        match self.entries.get(mint) {
            Some(entry) => {
                debug!(
                    "Hit for mint: {} (age: {}s)",
                    short_mint(mint),
                    entry.age_at(now).as_secs()
                );
                Some(entry.value.clone())
            }
            None => {
                debug!("Miss for mint: {}", short_mint(mint));
                None
            }
        }
    }

    /// Store a result with the default TTL.
    pub fn set(&self, mint: impl Into<Mint>, value: ListingQueryResult) {
        self.set_with_ttl(mint, value, None);
    }

    /// Store a result; `None` means the default TTL.
    pub fn set_with_ttl(
        &self,
        mint: impl Into<Mint>,
        value: ListingQueryResult,
        ttl: Option<Duration>,
    ) {
        let mint = mint.into();
        let ttl = ttl.unwrap_or(self.default_ttl);
        debug!("Stored data for mint: {} (TTL: {}s)", short_mint(&mint), ttl.as_secs());
        self.entries.insert(mint, CacheEntry::new(value, ttl));
    }

    /// Partition `mints` into cache hits and misses.
    pub fn get_multiple<S: AsRef<str>>(&self, mints: &[S]) -> BatchLookup {
        let mut batch = BatchLookup::default();
        for mint in mints {
            let mint = mint.as_ref();
            match self.get(mint) {
                Some(result) => {
                    batch.hits.insert(mint.to_string(), result);
                }
                None => batch.misses.push(mint.to_string()),
            }
        }

        debug!(
            "Batch lookup: {} hits, {} misses",
            batch.hits.len(),
            batch.misses.len()
        );
        batch
    }

    pub fn set_multiple(
        &self,
        entries: impl IntoIterator<Item = (Mint, ListingQueryResult)>,
        ttl: Option<Duration>,
    ) {
        let mut count = 0usize;
        for (mint, value) in entries {
            self.set_with_ttl(mint, value, ttl);
            count += 1;
        }
        debug!("Batch stored {} entries", count);
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn clean_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let cleaned = before.saturating_sub(self.entries.len());

        if cleaned > 0 {
            info!("Cleaned {} expired cache entries", cleaned);
        }
        cleaned
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries: Vec<EntryStats> = self
            .entries
            .iter()
            .map(|item| EntryStats {
                mint: short_mint(item.key()),
                age: item.value().age_at(now).as_secs(),
                ttl: item.value().ttl.as_secs(),
                listing_count: item.value().value.listings.len(),
            })
            .collect();

        CacheStats {
            size: entries.len(),
            entries,
        }
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let size = self.entries.len();
        self.entries.clear();
        info!("Cleared all {} cache entries", size);
        size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the periodic expiry sweep. The sweep stops when the returned
    /// handle is shut down or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> CacheSweeper {
        let cache = Arc::clone(self);
        CacheSweeper::spawn(interval, move || {
            let cache = Arc::clone(&cache);
            async move {
                cache.clean_expired();
            }
        })
    }
}

/// Handle to a recurring cleanup task.
pub struct CacheSweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    pub(crate) fn spawn<F, Fut>(period: Duration, mut sweep: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        // tokio intervals panic on a zero period
        let period = period.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            // First tick lands one full period after start
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => sweep().await,
                    _ = &mut shutdown_rx => {
                        debug!("Cache sweeper shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the sweep and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ListingRecord, MAGIC_EDEN_MARKETPLACE};

    fn listed(mint: &str, price: f64) -> ListingQueryResult {
        ListingQueryResult::new(
            mint,
            vec![ListingRecord {
                id: format!("{}-pda", mint),
                price,
                price_minor_units: crate::types::sol_to_lamports(price),
                seller: "Seller111".to_string(),
                token_mint: mint.to_string(),
                token_address: format!("{}-ata", mint),
                marketplace_id: MAGIC_EDEN_MARKETPLACE.to_string(),
                auction_house: None,
                expiry: 0,
            }],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_respects_ttl() {
        let cache = ListingCache::with_default_ttl(Duration::from_secs(600));
        cache.set_with_ttl("MintA", listed("MintA", 1.0), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert!(cache.get("MintA").is_some());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(cache.get("MintA").is_none());
        // Lazy eviction removed it
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_multiple_preserves_miss_order() {
        let cache = ListingCache::with_default_ttl(Duration::from_secs(600));
        cache.set("A", listed("A", 2.0));

        let batch = cache.get_multiple(&["A", "B", "C"]);

        assert_eq!(batch.hits.len(), 1);
        assert_eq!(batch.hits["A"].mint, "A");
        assert_eq!(batch.misses, vec!["B".to_string(), "C".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_multiple_and_clean_expired() {
        let cache = ListingCache::with_default_ttl(Duration::from_secs(600));
        cache.set_multiple(
            vec![
                ("A".to_string(), listed("A", 1.0)),
                ("B".to_string(), ListingQueryResult::unlisted("B")),
            ],
            Some(Duration::from_secs(10)),
        );
        cache.set("C", listed("C", 3.0));
        assert_eq!(cache.len(), 3);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.clean_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("C").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_clear() {
        let cache = ListingCache::with_default_ttl(Duration::from_secs(600));
        cache.set("DRiP2Pn2K6fuMLKQmt5rZWyHiUZ6WK3GChEySUpHSS4x", listed("DRiP", 1.0));
        tokio::time::advance(Duration::from_secs(42)).await;

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.entries[0].mint, "DRiP2Pn2...");
        assert_eq!(stats.entries[0].age, 42);
        assert_eq!(stats.entries[0].ttl, 600);
        assert_eq!(stats.entries[0].listing_count, 1);

        assert_eq!(cache.clear(), 1);
        assert!(cache.get("DRiP2Pn2K6fuMLKQmt5rZWyHiUZ6WK3GChEySUpHSS4x").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_unread_entries() {
        let cache = Arc::new(ListingCache::with_default_ttl(Duration::from_secs(60)));
        cache.set("A", listed("A", 1.0));

        let sweeper = cache.spawn_sweeper(Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(cache.is_empty());

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_after_shutdown() {
        let cache = Arc::new(ListingCache::with_default_ttl(Duration::from_secs(60)));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(300));
        sweeper.shutdown().await;

        cache.set("A", listed("A", 1.0));
        tokio::time::sleep(Duration::from_secs(601)).await;
        // Nobody swept, the expired entry is still physically present
        assert_eq!(cache.len(), 1);
        assert!(cache.get("A").is_none());
    }
}
