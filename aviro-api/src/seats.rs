use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use aviro_core::SeatMap;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/seats/{flight_id}", get(get_seat_map))
        .route("/seats/{flight_id}/hold", post(hold_seats))
        .route("/seats/{flight_id}/confirm", post(confirm_seats))
        .route("/seats/{flight_id}/release", post(release_seats))
}

#[derive(Debug, Deserialize)]
struct SeatActionRequest {
    seat_ids: Vec<String>,
    /// Session or user identity owning the hold.
    holder: String,
    /// Hold duration override in minutes; bounded by the server default.
    hold_minutes: Option<i64>,
}

impl SeatActionRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.seat_ids.is_empty() {
            return Err(AppError::ValidationError("seat_ids is required".into()));
        }
        if self.holder.trim().is_empty() {
            return Err(AppError::ValidationError("holder is required".into()));
        }
        Ok(())
    }
}

async fn get_seat_map(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> Result<Json<SeatMap>, AppError> {
    let map = state.inventory.get(&flight_id).await?;
    Ok(Json(map))
}

async fn hold_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(payload): Json<SeatActionRequest>,
) -> Result<Json<SeatMap>, AppError> {
    payload.validate()?;
    let minutes = payload
        .hold_minutes
        .filter(|m| *m > 0 && *m <= state.hold_minutes)
        .unwrap_or(state.hold_minutes);
    let map = state
        .inventory
        .hold(&flight_id, &payload.seat_ids, &payload.holder, minutes)
        .await?;
    Ok(Json(map))
}

async fn confirm_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(payload): Json<SeatActionRequest>,
) -> Result<Json<SeatMap>, AppError> {
    payload.validate()?;
    let map = state
        .inventory
        .confirm(&flight_id, &payload.seat_ids, &payload.holder)
        .await?;
    Ok(Json(map))
}

async fn release_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(payload): Json<SeatActionRequest>,
) -> Result<Json<SeatMap>, AppError> {
    payload.validate()?;
    let map = state
        .inventory
        .release(&flight_id, &payload.seat_ids, &payload.holder)
        .await?;
    Ok(Json(map))
}
