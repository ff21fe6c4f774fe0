//! Core types and data structures for marketplace listing lookups.

use serde::{Deserialize, Serialize};

/// An NFT mint address. Treated as an opaque cache key.
pub type Mint = String;

/// Lamports per SOL; listing prices are quoted in SOL with 9 decimal places.
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Tag identifying the marketplace that produced a listing.
pub const MAGIC_EDEN_MARKETPLACE: &str = "magic_eden";

/// A single active marketplace listing, normalized from the upstream payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    /// Marketplace-assigned listing identifier
    pub id: String,
    /// Price in SOL
    pub price: f64,
    /// Price in lamports, `round(price * 10^9)`
    #[serde(rename = "priceLamports")]
    pub price_minor_units: u64,
    /// Seller wallet address
    pub seller: String,
    pub token_mint: String,
    pub token_address: String,
    /// Upstream source tag (e.g. "magic_eden")
    #[serde(rename = "marketplace")]
    pub marketplace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_house: Option<String>,
    /// Expiration as unix seconds; 0 means no expiry
    #[serde(default)]
    pub expiry: i64,
}

/// Result of looking up the listings of one mint. This is the unit both
/// caches store and hand back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingQueryResult {
    pub mint: Mint,
    /// Active listings; empty means the mint is confirmed unlisted
    pub listings: Vec<ListingRecord>,
    pub count: usize,
}

impl ListingQueryResult {
    /// Build a result, keeping `count` in sync with `listings`.
    pub fn new(mint: impl Into<Mint>, listings: Vec<ListingRecord>) -> Self {
        let count = listings.len();
        Self {
            mint: mint.into(),
            listings,
            count,
        }
    }

    /// A confirmed "not listed" result.
    pub fn unlisted(mint: impl Into<Mint>) -> Self {
        Self::new(mint, Vec::new())
    }

    /// The listing surfaced to the UI, if any.
    pub fn best(&self) -> Option<&ListingRecord> {
        self.listings.first()
    }

    pub fn is_listed(&self) -> bool {
        !self.listings.is_empty()
    }
}

/// Body of a listings lookup request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingsRequest {
    #[serde(default)]
    pub mint: Option<String>,
}

/// Body returned by the listings route. Soft failures carry an empty
/// `listings` plus `error` or `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingsResponse {
    #[serde(default)]
    pub listings: Vec<ListingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<Mint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<ListingQueryResult> for ListingsResponse {
    fn from(result: ListingQueryResult) -> Self {
        let message = if result.is_listed() {
            None
        } else {
            Some("No listings found for this NFT".to_string())
        };
        Self {
            count: Some(result.count),
            mint: Some(result.mint),
            listings: result.listings,
            error: None,
            message,
        }
    }
}

impl ListingsResponse {
    /// A soft failure with no listings.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Convert back into a query result for `mint`.
    pub fn into_result(self, mint: &str) -> ListingQueryResult {
        ListingQueryResult::new(self.mint.unwrap_or_else(|| mint.to_string()), self.listings)
    }
}

/// Convert a SOL price to lamports.
pub fn sol_to_lamports(price: f64) -> u64 {
    if !price.is_finite() || price <= 0.0 {
        return 0;
    }
    (price * LAMPORTS_PER_SOL).round() as u64
}

/// First 8 characters of a mint, for log lines and debug output.
pub fn short_mint(mint: &str) -> String {
    let prefix: String = mint.chars().take(8).collect();
    if prefix.len() < mint.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}
