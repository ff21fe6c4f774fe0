use crate::listing::{validate_mint, CacheStats, ListingError, PriceSummary};
use crate::server::state::AppState;
use crate::types::{short_mint, ListingsRequest, ListingsResponse, Mint};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// POST /api/agent-tools/listings
pub async fn post_listings(
    State(state): State<AppState>,
    Json(req): Json<ListingsRequest>,
) -> (StatusCode, Json<ListingsResponse>) {
    lookup_listings(&state, req.mint).await
}

/// GET /api/agent-tools/listings?mint=
pub async fn get_listings(
    State(state): State<AppState>,
    Query(req): Query<ListingsRequest>,
) -> (StatusCode, Json<ListingsResponse>) {
    lookup_listings(&state, req.mint).await
}

/// Cache-first lookup of one mint.
async fn lookup_listings(
    state: &AppState,
    mint: Option<String>,
) -> (StatusCode, Json<ListingsResponse>) {
    let mint = match mint.as_deref().map(validate_mint) {
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ListingsResponse::failure("Mint address is required")),
            )
        }
        Some(Err(e)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ListingsResponse::failure(e.to_string())),
            )
        }
        Some(Ok(mint)) => mint,
    };

    if let Some(cached) = state.cache.get(mint) {
        return (StatusCode::OK, Json(cached.into()));
    }

    match state.source.fetch_listings(mint).await {
        Ok(result) => {
            state.cache.set(mint, result.clone());
            (StatusCode::OK, Json(result.into()))
        }
        Err(ListingError::InvalidInput(message)) => (
            StatusCode::BAD_REQUEST,
            Json(ListingsResponse::failure(message)),
        ),
        Err(e) => {
            error!("Error fetching listings for {}: {}", short_mint(mint), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ListingsResponse::failure("Failed to fetch listings")),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceSummaryRequest {
    #[serde(default)]
    pub mints: Option<Vec<Mint>>,
}

#[derive(Debug, Serialize)]
pub struct PriceSummaryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PriceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// POST /api/agent-tools/price-summary
pub async fn price_summary(
    State(state): State<AppState>,
    Json(req): Json<PriceSummaryRequest>,
) -> (StatusCode, Json<PriceSummaryResponse>) {
    let Some(mints) = req.mints else {
        return (
            StatusCode::BAD_REQUEST,
            Json(PriceSummaryResponse {
                success: false,
                summary: None,
                message: None,
                error: Some("mints array is required".to_string()),
                timestamp: Utc::now().to_rfc3339(),
            }),
        );
    };

    info!("Getting price summary for {} NFTs", mints.len());
    let summary = state.price_summary.summarize(&mints).await;

    (
        StatusCode::OK,
        Json(PriceSummaryResponse {
            success: true,
            message: Some(summary.message()),
            summary: Some(summary),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub total_entries: usize,
    pub total_listings: usize,
    /// Mean entry age in seconds
    pub avg_age: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheStatusBody {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub summary: CacheSummary,
}

impl From<CacheStats> for CacheStatusBody {
    fn from(stats: CacheStats) -> Self {
        let total_listings = stats.entries.iter().map(|e| e.listing_count).sum();
        let avg_age = if stats.entries.is_empty() {
            0
        } else {
            let total_age: u64 = stats.entries.iter().map(|e| e.age).sum();
            (total_age as f64 / stats.entries.len() as f64).round() as u64
        };

        Self {
            summary: CacheSummary {
                total_entries: stats.size,
                total_listings,
                avg_age,
            },
            stats,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStatusBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

/// GET /api/debug/cache-status
pub async fn cache_status(State(state): State<AppState>) -> Json<CacheStatusResponse> {
    Json(CacheStatusResponse {
        success: true,
        cache: Some(state.cache.stats().into()),
        message: None,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// DELETE /api/debug/cache-status
pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheStatusResponse> {
    let cleared = state.cache.clear();
    info!("Debug endpoint cleared {} cache entries", cleared);

    Json(CacheStatusResponse {
        success: true,
        cache: None,
        message: Some("Cache cleared successfully".to_string()),
        timestamp: Utc::now().to_rfc3339(),
    })
}
