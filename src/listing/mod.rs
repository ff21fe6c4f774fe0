//! Listing lookup subsystem - request governor and shared response cache.
//!
//! Two halves solve the same problem from either side of the wire. The
//! [`ListingGovernor`] sits in front of many independent callers and paces
//! their lookups so the aggregate rate stays under the marketplace quota.
//! The [`ListingCache`] sits in the serving process and short-circuits
//! repeated upstream calls across unrelated requests.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod governor;
pub mod source;
pub mod summary;

// Re-export main public types
pub use cache::{BatchLookup, CacheStats, CacheSweeper, EntryStats, ListingCache};
pub use config::{CacheConfig, GovernorBuilder, GovernorConfig, ServerConfig};
pub use entry::CacheEntry;
pub use error::ListingError;
pub use governor::{GovernorStatus, ListingGovernor};
pub use source::{
    normalize_marketplace_listings, validate_mint, ListingSource, ListingsRouteSource,
    MagicEdenSource,
};
pub use summary::{CachePerformance, MintStatus, PriceRange, PriceSummary, PriceSummaryService};
