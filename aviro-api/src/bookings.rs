use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use aviro_booking::{CancelOptions, CreateBookingRequest};
use aviro_core::Booking;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/by-user/{user_id}", get(list_bookings_by_user))
}

/// POST /bookings
///
/// Creates a booking with server-side pricing. An `Idempotency-Key` header
/// makes retries of the same request return the original booking.
async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());

    let booking = state.lifecycle.create(&payload, idempotency_key).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.lifecycle.get(id).await?;
    Ok(Json(booking))
}

async fn list_bookings_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state.lifecycle.list_by_user(&user_id).await?;
    Ok(Json(bookings))
}

/// POST /bookings/{id}/cancel
///
/// Cancels a booking, restores its seats and, when it was paid, refunds
/// the total minus the cancellation fee. Both behaviors can be switched
/// off in the body.
async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelBookingRequest>>,
) -> Result<Json<Booking>, AppError> {
    let opts = payload.map(|Json(p)| p.into_options()).unwrap_or_default();
    let booking = state.lifecycle.cancel(id, opts).await?;
    Ok(Json(booking))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CancelBookingRequest {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default = "default_true")]
    refund: bool,
    #[serde(default = "default_true")]
    restore_inventory: bool,
}

impl CancelBookingRequest {
    fn into_options(self) -> CancelOptions {
        CancelOptions {
            reason: self.reason,
            refund: self.refund,
            restore_inventory: self.restore_inventory,
        }
    }
}
