//! Upstream listing sources.
//!
//! [`ListingSource`] is the one operation both the governor and the server
//! cache wrap: fetch the normalized listings of a mint. Two network
//! implementations live here, one talking to the marketplace API directly
//! (server side) and one calling this crate's own listings route (client
//! side).

use crate::listing::error::ListingError;
use crate::types::{
    short_mint, sol_to_lamports, ListingQueryResult, ListingRecord, ListingsRequest,
    ListingsResponse, MAGIC_EDEN_MARKETPLACE,
};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest mint string accepted; base58 Solana addresses are at most 44 chars.
const MAX_MINT_LEN: usize = 64;

/// Reject empty or malformed mints before they reach a queue or a URL.
pub fn validate_mint(mint: &str) -> Result<&str, ListingError> {
    if mint.trim().is_empty() {
        return Err(ListingError::InvalidInput("mint address is required".to_string()));
    }
    if mint.len() > MAX_MINT_LEN {
        return Err(ListingError::InvalidInput(format!(
            "mint address longer than {} characters",
            MAX_MINT_LEN
        )));
    }
    if !mint.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ListingError::InvalidInput(format!(
            "mint address '{}' contains invalid characters",
            mint
        )));
    }
    Ok(mint)
}

/// Fetch the listings of one mint.
///
/// Implementations normalize whatever the upstream returns into
/// [`ListingRecord`]s and report non-2xx statuses, network failures and
/// timeouts as distinct [`ListingError`] variants.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listings(&self, mint: &str) -> Result<ListingQueryResult, ListingError>;
}

/// Listing as returned by the marketplace `tokens/{mint}/listings` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListing {
    pda_address: Option<String>,
    #[serde(default)]
    token_address: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    seller: String,
    #[serde(default)]
    token_mint: String,
    auction_house: Option<String>,
    expiry: Option<i64>,
}

impl From<RawListing> for ListingRecord {
    fn from(raw: RawListing) -> Self {
        ListingRecord {
            id: raw
                .pda_address
                .filter(|pda| !pda.is_empty())
                .unwrap_or_else(|| raw.token_address.clone()),
            price: raw.price,
            price_minor_units: sol_to_lamports(raw.price),
            seller: raw.seller,
            token_mint: raw.token_mint,
            token_address: raw.token_address,
            marketplace_id: MAGIC_EDEN_MARKETPLACE.to_string(),
            auction_house: raw.auction_house,
            expiry: raw.expiry.unwrap_or(0).max(0),
        }
    }
}

/// Normalize a marketplace listings payload. Anything but an array means
/// "no listings".
pub fn normalize_marketplace_listings(
    mint: &str,
    body: serde_json::Value,
) -> Result<ListingQueryResult, ListingError> {
    if !body.is_array() {
        debug!("Non-array listings payload for {}, treating as unlisted", short_mint(mint));
        return Ok(ListingQueryResult::unlisted(mint));
    }

    let raw: Vec<RawListing> =
        serde_json::from_value(body).map_err(|e| ListingError::Decode(e.to_string()))?;
    let listings = raw.into_iter().map(ListingRecord::from).collect();

    Ok(ListingQueryResult::new(mint, listings))
}

/// Direct client for the Magic Eden marketplace API, paced by a
/// requests-per-minute quota.
pub struct MagicEdenSource {
    http_client: Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
}

impl MagicEdenSource {
    pub fn new(
        base_url: impl Into<String>,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Result<Self, ListingError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http_client, base_url, requests_per_minute))
    }

    pub fn with_client(
        http_client: Client,
        base_url: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    fn listings_url(&self, mint: &str) -> String {
        format!("{}/tokens/{}/listings", self.base_url, mint)
    }
}

#[async_trait]
impl ListingSource for MagicEdenSource {
    #[instrument(skip(self, mint), fields(mint = %short_mint(mint)))]
    async fn fetch_listings(&self, mint: &str) -> Result<ListingQueryResult, ListingError> {
        let mint = validate_mint(mint)?;
        self.limiter.until_ready().await;

        let response = self
            .http_client
            .get(self.listings_url(mint))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No listings found for {}", short_mint(mint));
            return Ok(ListingQueryResult::unlisted(mint));
        }
        if !status.is_success() {
            warn!("Marketplace API error {} for {}", status, short_mint(mint));
            return Err(ListingError::UpstreamHttp {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let result = normalize_marketplace_listings(mint, body)?;
        debug!("Fetched {} listings for {}", result.count, short_mint(mint));
        Ok(result)
    }
}

/// Client for this crate's own `POST /api/agent-tools/listings` route.
pub struct ListingsRouteSource {
    http_client: Client,
    endpoint: String,
}

impl ListingsRouteSource {
    pub const LISTINGS_PATH: &'static str = "/api/agent-tools/listings";

    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ListingError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http_client, server_url))
    }

    pub fn with_client(http_client: Client, server_url: &str) -> Self {
        Self {
            http_client,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), Self::LISTINGS_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ListingSource for ListingsRouteSource {
    #[instrument(skip(self, mint), fields(mint = %short_mint(mint)))]
    async fn fetch_listings(&self, mint: &str) -> Result<ListingQueryResult, ListingError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&ListingsRequest {
                mint: Some(mint.to_string()),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::UpstreamHttp {
                status: status.as_u16(),
            });
        }

        let body: ListingsResponse = response.json().await?;
        Ok(body.into_result(mint))
    }
}
