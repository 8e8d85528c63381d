use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use aviro_booking::{BookingError, ReconcileError};
use aviro_inventory::SeatError;
use aviro_payments::PaymentError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<SeatError> for AppError {
    fn from(err: SeatError) -> Self {
        match err {
            SeatError::MapNotFound(_) => AppError::NotFoundError(err.to_string()),
            SeatError::InvalidSeat(_) => AppError::ValidationError(err.to_string()),
            SeatError::SeatUnavailable(_) | SeatError::Conflict => {
                AppError::ConflictError(err.to_string())
            }
            SeatError::Store(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidInput(_) | BookingError::Pricing(_) => {
                AppError::ValidationError(err.to_string())
            }
            BookingError::Seat(seat) => seat.into(),
            BookingError::NotFound => AppError::NotFoundError("booking not found".into()),
            BookingError::AlreadyCancelled => AppError::ConflictError(err.to_string()),
            BookingError::RefundFailed(msg) => AppError::UpstreamError(msg),
            BookingError::Store(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::BookingNotFound => AppError::NotFoundError(err.to_string()),
            PaymentError::NoStoredSession
            | PaymentError::MissingChargeReference
            | PaymentError::AlreadyRefunded
            | PaymentError::InvalidPayload(_) => AppError::ValidationError(err.to_string()),
            PaymentError::InvalidSignature => {
                AppError::ValidationError("invalid webhook signature".into())
            }
            PaymentError::Processor(msg) => AppError::UpstreamError(msg),
            PaymentError::Store(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Store(msg) => AppError::InternalServerError(msg),
        }
    }
}
