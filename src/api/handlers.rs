use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::geo;
use crate::models::{
    split_external_id, DetailItem, Request, RequestDetailResponse, Station,
};
use crate::services::{clamp_count, SubmissionItem, SubmitResponse};

use super::AppState;

/// Places shown on one board's detail view.
const BOARD_VIEW_LIMIT: i64 = 100;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub owner_nickname: String,
    pub station_code: String,
    pub request_message: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    #[serde(default)]
    pub items: Vec<SubmissionItem>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequestParams {
    pub owner_nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AutoRecommendParams {
    pub slug: String,
    pub n: Option<i64>,
    /// Accepted for backward compatibility, no longer consulted.
    pub q: Option<String>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Creates a shareable recommendation board anchored to one station
pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> AppResult<(StatusCode, Json<Request>)> {
    let owner_nickname = body.owner_nickname.trim().to_string();
    if !(2..=16).contains(&owner_nickname.chars().count()) {
        return Err(AppError::InvalidInput(
            "owner_nickname must be 2 to 16 characters".to_string(),
        ));
    }

    let request_message = body.request_message.trim().to_string();
    if request_message.is_empty() || request_message.chars().count() > 500 {
        return Err(AppError::InvalidInput(
            "request_message must be 1 to 500 characters".to_string(),
        ));
    }

    let station = state
        .store
        .find_station(body.station_code.trim())
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("unknown station code: {}", body.station_code.trim()))
        })?;

    let request = Request {
        slug: Uuid::new_v4().simple().to_string(),
        owner_nickname,
        station_code: station.code,
        request_message,
        created_at: Utc::now(),
    };
    state.store.create_request(&request).await?;
    state.summary_queue.enqueue(&request.slug);

    tracing::info!(slug = %request.slug, station = %request.station_code, "Request created");

    Ok((StatusCode::CREATED, Json(request)))
}

/// Detail view: the board's aggregated places with counts, enrichment
/// and any stored summaries
pub async fn get_request(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<RequestDetailResponse>> {
    let request = state
        .store
        .find_request(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("request not found".to_string()))?;
    let station = state
        .store
        .find_station(&request.station_code)
        .await?
        .ok_or_else(|| AppError::NotFound("station not found".to_string()))?;

    let items = board_items(&state, &slug, &station).await?;

    Ok(Json(RequestDetailResponse {
        slug: request.slug,
        station,
        request_message: request.request_message,
        items,
    }))
}

/// Deletes a board after an ownership check; its aggregates and notes go
/// with it, places survive
pub async fn delete_request(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<DeleteRequestParams>,
) -> AppResult<StatusCode> {
    let request = state
        .store
        .find_request(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("request not found".to_string()))?;

    let owner_nickname = params
        .owner_nickname
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("owner_nickname is required".to_string()))?;
    if owner_nickname != request.owner_nickname {
        return Err(AppError::Forbidden(
            "only the board owner can delete it".to_string(),
        ));
    }

    state.store.delete_request(&slug).await?;

    tracing::info!(slug = %slug, "Request deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Processes a submission batch against a board
pub async fn submit_recommendations(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<SubmitBody>,
) -> AppResult<Json<SubmitResponse>> {
    let response = state.aggregator.submit(&slug, body.items).await?;

    // Summary backfill runs after the batch is durable.
    if response.totals.saved > 0 {
        state.summary_queue.enqueue(&slug);
    }

    Ok(Json(response))
}

/// Plans auto-recommendations for a board
pub async fn auto_recommend(
    State(state): State<AppState>,
    Query(params): Query<AutoRecommendParams>,
) -> AppResult<Json<RequestDetailResponse>> {
    if let Some(q) = params.q.as_deref() {
        tracing::debug!(q = %q, "Ignoring deprecated q parameter");
    }

    let response = state
        .planner
        .plan(&params.slug, clamp_count(params.n))
        .await?;

    Ok(Json(response))
}

/// Builds the detail-view item list from the board's aggregates.
async fn board_items(
    state: &AppState,
    slug: &str,
    station: &Station,
) -> AppResult<Vec<DetailItem>> {
    let aggregated = state.store.list_aggregated(slug, BOARD_VIEW_LIMIT).await?;
    let external_ids: Vec<String> = aggregated
        .iter()
        .map(|a| a.place.external_id.clone())
        .collect();

    let mut enrichment = state.store.enrichment_for(&external_ids).await?;
    let mut summaries = state.store.summaries_for(&external_ids).await?;

    let mut items: Vec<DetailItem> = aggregated
        .into_iter()
        .map(|aggregate| {
            let place = aggregate.place;
            let provider_local_id = split_external_id(&place.external_id)
                .map(|(_, local)| local.to_string())
                .unwrap_or_else(|| place.external_id.clone());

            DetailItem {
                id: provider_local_id,
                distance_m: geo::distance_m(station.lat, station.lng, &place.y, &place.x),
                enrichment: enrichment
                    .remove(&place.external_id)
                    .filter(|e| !e.is_empty()),
                ai: summaries.remove(&place.external_id),
                recommended_count: Some(aggregate.recommended_count),
                place_name: place.place_name,
                category_group_code: place.category_group_code,
                category_group_name: place.category_group_name,
                category_name: place.category_name,
                address_name: place.address_name,
                road_address_name: place.road_address_name,
                x: place.x,
                y: place.y,
                place_url: place.place_url,
                external_id: place.external_id,
            }
        })
        .collect();

    // Most recommended first; ties broken by proximity, unknown distance last.
    items.sort_by(|a, b| {
        b.recommended_count
            .cmp(&a.recommended_count)
            .then_with(|| {
                let da = a.distance_m.map_or(i64::MAX, i64::from);
                let db = b.distance_m.map_or(i64::MAX, i64::from);
                da.cmp(&db)
            })
    });

    Ok(items)
}
