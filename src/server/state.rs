use crate::listing::{ListingCache, ListingSource, PriceSummaryService};
use std::sync::Arc;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ListingCache>,
    pub source: Arc<dyn ListingSource>,
    pub price_summary: Arc<PriceSummaryService>,
}

impl AppState {
    pub fn new(
        cache: Arc<ListingCache>,
        source: Arc<dyn ListingSource>,
        price_summary_deadline: std::time::Duration,
    ) -> Self {
        let price_summary = Arc::new(PriceSummaryService::new(
            Arc::clone(&cache),
            Arc::clone(&source),
            price_summary_deadline,
        ));

        Self {
            cache,
            source,
            price_summary,
        }
    }
}
