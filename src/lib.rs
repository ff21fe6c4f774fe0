//! nft-listing-cache - rate-limited, cached NFT listing lookups
//!
//! This crate shields a marketplace API with a strict requests-per-minute
//! quota from the many UI widgets that all want to know "is this NFT listed,
//! and for how much". A client-side governor paces and caches lookups; a
//! server-side TTL cache absorbs repeats across users.

pub mod listing;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use listing::{ListingCache, ListingError, ListingGovernor, ListingSource};
pub use types::{ListingQueryResult, ListingRecord, Mint};
