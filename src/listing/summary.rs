//! Cache-first batch price summary.
//!
//! Serves what it can from the shared [`ListingCache`] and only sends the
//! misses upstream, concurrently and under one overall deadline.

use crate::listing::cache::ListingCache;
use crate::listing::source::ListingSource;
use crate::types::{short_mint, ListingQueryResult, Mint};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

/// Listing state of one mint within a summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MintStatus {
    Listed {
        price: f64,
        seller: String,
        #[serde(rename = "listingId")]
        listing_id: String,
    },
    Unlisted,
    Error {
        error: String,
    },
}

impl From<&ListingQueryResult> for MintStatus {
    fn from(result: &ListingQueryResult) -> Self {
        match result.best() {
            Some(listing) => MintStatus::Listed {
                price: listing.price,
                seller: listing.seller.clone(),
                listing_id: listing.id.clone(),
            },
            None => MintStatus::Unlisted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedMint {
    pub mint: Mint,
    pub price: f64,
    /// Seller address shortened for display
    pub seller: String,
    pub listing_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePerformance {
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSummary {
    pub total: usize,
    /// Mints with a definite answer (listed, unlisted or error)
    pub checked: usize,
    pub listed: usize,
    pub unlisted: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    pub listings: Vec<ListedMint>,
    pub cache_performance: CachePerformance,
}

impl PriceSummary {
    /// One-line human description of the summary.
    pub fn message(&self) -> String {
        match &self.price_range {
            Some(range) => format!(
                "Found {} NFTs with active listings out of {} checked. \
                 Prices range from {:.2} to {:.2} SOL.",
                self.listed, self.total, range.min, range.max
            ),
            None => format!(
                "Checked {} NFTs - none currently have active listings on Magic Eden.",
                self.checked
            ),
        }
    }
}

/// Builds price summaries over many mints at once.
pub struct PriceSummaryService {
    cache: Arc<ListingCache>,
    source: Arc<dyn ListingSource>,
    deadline: Duration,
}

impl PriceSummaryService {
    pub fn new(
        cache: Arc<ListingCache>,
        source: Arc<dyn ListingSource>,
        deadline: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            deadline,
        }
    }

    /// Summarize `mints`. Lookups that have not finished when the deadline
    /// passes are abandoned and left out of `checked`. A mint repeated in the
    /// input is looked up once.
    #[instrument(skip(self, mints), fields(total = mints.len()))]
    pub async fn summarize(&self, mints: &[Mint]) -> PriceSummary {
        let mut seen = HashSet::new();
        let unique: Vec<&Mint> = mints.iter().filter(|mint| seen.insert(*mint)).collect();

        let batch = self.cache.get_multiple(unique.as_slice());
        let hits = batch.hits.len();
        let misses = batch.misses.len();

        let mut statuses: HashMap<Mint, MintStatus> = batch
            .hits
            .iter()
            .map(|(mint, result)| (mint.clone(), MintStatus::from(result)))
            .collect();

        let fetched = self.fetch_misses(batch.misses, &mut statuses).await;
        self.cache.set_multiple(fetched, None);

        let summary = build_summary(mints, &statuses, hits, misses);
        info!(
            "Price summary: {} listed, {} unlisted, {} errors out of {} ({} cache hits)",
            summary.listed, summary.unlisted, summary.errors, summary.total, hits
        );
        summary
    }

    /// Fetch every miss concurrently; returns the successful results so the
    /// caller can cache them.
    async fn fetch_misses(
        &self,
        misses: Vec<Mint>,
        statuses: &mut HashMap<Mint, MintStatus>,
    ) -> Vec<(Mint, ListingQueryResult)> {
        let mut fetched = Vec::new();
        if misses.is_empty() {
            return fetched;
        }

        let mut lookups = JoinSet::new();
        for mint in misses {
            let source = Arc::clone(&self.source);
            lookups.spawn(async move {
                let result = source.fetch_listings(&mint).await;
                (mint, result)
            });
        }

        let deadline = Instant::now() + self.deadline;
        loop {
            match timeout_at(deadline, lookups.join_next()).await {
                Ok(Some(Ok((mint, Ok(result))))) => {
                    statuses.insert(mint.clone(), MintStatus::from(&result));
                    fetched.push((mint, result));
                }
                Ok(Some(Ok((mint, Err(e))))) => {
                    warn!("Error checking listing for {}: {}", short_mint(&mint), e);
                    statuses.insert(mint, MintStatus::Error { error: e.to_string() });
                }
                Ok(Some(Err(join_error))) => {
                    warn!("Listing lookup task failed: {}", join_error);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Price summary deadline of {:?} reached, abandoning {} lookups",
                        self.deadline,
                        lookups.len()
                    );
                    lookups.abort_all();
                    break;
                }
            }
        }

        fetched
    }
}

fn build_summary(
    mints: &[Mint],
    statuses: &HashMap<Mint, MintStatus>,
    hits: usize,
    misses: usize,
) -> PriceSummary {
    let mut listings = Vec::new();
    let mut checked = 0;
    let mut unlisted = 0;
    let mut errors = 0;

    for mint in mints {
        let Some(status) = statuses.get(mint) else {
            continue;
        };
        checked += 1;
        match status {
            MintStatus::Listed {
                price,
                seller,
                listing_id,
            } => listings.push(ListedMint {
                mint: mint.clone(),
                price: *price,
                seller: short_mint(seller),
                listing_id: listing_id.clone(),
            }),
            MintStatus::Unlisted => unlisted += 1,
            MintStatus::Error { .. } => errors += 1,
        }
    }

    let price_range = if listings.is_empty() {
        None
    } else {
        let prices = listings.iter().map(|l| l.price);
        let min = prices.clone().fold(f64::INFINITY, f64::min);
        let max = prices.clone().fold(f64::NEG_INFINITY, f64::max);
        let average = prices.sum::<f64>() / listings.len() as f64;
        Some(PriceRange { min, max, average })
    };

    let lookups = hits + misses;
    PriceSummary {
        total: mints.len(),
        checked,
        listed: listings.len(),
        unlisted,
        errors,
        price_range,
        listings,
        cache_performance: CachePerformance {
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        },
    }
}
