use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use aviro_core::payment::{CheckoutSession, RefundInfo};
use aviro_payments::{RefundRequest, WebhookOutcome};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/create-checkout-session", post(create_session))
        .route("/payments/webhook", post(handle_webhook))
        .route("/payments/refund", post(refund))
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    booking_id: Uuid,
    /// Client-supplied amount, logged and ignored. The charge always comes
    /// from the stored booking price.
    amount: Option<i64>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    let session = state
        .gateway
        .create_session(payload.booking_id, payload.amount)
        .await?;
    Ok(Json(session))
}

/// POST /payments/webhook
///
/// Raw body handler: the signature covers the exact bytes the processor
/// sent, so this must not go through JSON extraction first.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    let outcome = state.gateway.handle_webhook(&body, signature).await?;

    let body = match outcome {
        WebhookOutcome::Confirmed(id) => json!({ "received": true, "booking_id": id }),
        WebhookOutcome::Duplicate(id) => {
            json!({ "received": true, "booking_id": id, "duplicate": true })
        }
        WebhookOutcome::Unmatched => json!({ "received": true, "matched": false }),
        WebhookOutcome::Ignored => json!({ "received": true }),
    };
    Ok((StatusCode::OK, Json(body)))
}

async fn refund(
    State(state): State<AppState>,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<RefundInfo>, AppError> {
    let refund = state.gateway.refund(&payload).await?;
    Ok(Json(refund))
}
