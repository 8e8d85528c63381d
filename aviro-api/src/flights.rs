use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use aviro_core::{FlightOffer, FlightSearchQuery};

use crate::error::AppError;
use crate::state::AppState;

const SEARCH_ATTEMPTS: u32 = 2;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/flights/search", get(search_flights))
        .route("/flights/revalidate/{offer_id}", get(revalidate_offer))
}

/// Re-price a previously returned offer before the customer commits.
async fn revalidate_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let offer = state
        .provider
        .revalidate(&offer_id)
        .await
        .map_err(|e| AppError::UpstreamError(e.to_string()))?;
    Ok(Json(json!({ "offer": offer })))
}

/// GET /flights/search?origin=SYD&destination=MEL&date=2026-09-01
///
/// Asks the airline provider first, with a bounded retry. Provider trouble
/// is collected as diagnostics rather than surfaced as an error, and the
/// local flight table serves as fallback.
async fn search_flights(
    State(state): State<AppState>,
    Query(query): Query<FlightSearchQuery>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if query.origin.trim().is_empty() || query.destination.trim().is_empty() {
        return Err(AppError::ValidationError(
            "origin and destination are required".into(),
        ));
    }

    let mut diagnostics = Vec::new();

    for attempt in 1..=SEARCH_ATTEMPTS {
        match state.provider.search(&query).await {
            Ok(offers) if !offers.is_empty() => {
                return Ok((
                    StatusCode::OK,
                    Json(json!({
                        "source": "provider",
                        "offers": offers,
                        "diagnostics": diagnostics,
                    })),
                ));
            }
            Ok(_) => {
                diagnostics.push(format!(
                    "provider {} returned no offers (attempt {})",
                    state.provider.name(),
                    attempt
                ));
                break;
            }
            Err(e) => {
                tracing::warn!(provider = state.provider.name(), attempt, error = %e, "provider search failed");
                diagnostics.push(format!(
                    "provider {} attempt {} failed: {}",
                    state.provider.name(),
                    attempt,
                    e
                ));
            }
        }
    }

    let local = state
        .flights
        .search(&query.origin, &query.destination, query.date)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if local.is_empty() {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "no flights available for this route and date",
                "diagnostics": diagnostics,
            })),
        ));
    }

    let offers: Vec<FlightOffer> = local.iter().map(FlightOffer::from_flight).collect();
    Ok((
        StatusCode::OK,
        Json(json!({
            "source": "local",
            "offers": offers,
            "diagnostics": diagnostics,
        })),
    ))
}
