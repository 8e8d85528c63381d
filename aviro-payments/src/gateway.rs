use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use aviro_core::model::booking::{
    Booking, BookingStatus, RefundRecord, SessionParams, Ticketing,
};
use aviro_core::notify::Mailer;
use aviro_core::payment::{CheckoutSession, PaymentProcessor, RefundInfo, RefundTarget};
use aviro_core::repository::BookingRepository;

use crate::webhook;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Endpoint secret for webhook signatures. When unset, verification
    /// is skipped with a warning (development only).
    pub webhook_secret: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("booking not found")]
    BookingNotFound,
    #[error("booking has no stored session parameters")]
    NoStoredSession,
    #[error("no charge or payment intent to refund against")]
    MissingChargeReference,
    #[error("a refund already exists for this booking")]
    AlreadyRefunded,
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    InvalidPayload(String),
    #[error("payment processor error: {0}")]
    Processor(String),
    #[error("storage error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment captured; the booking moved to PAID.
    Confirmed(Uuid),
    /// Redelivery of an event we already applied.
    Duplicate(Uuid),
    /// Event parsed but no booking matched any reference in it.
    Unmatched,
    /// An event type we do not handle.
    Ignored,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    pub booking_id: Option<Uuid>,
    pub booking_ref: Option<String>,
    pub charge_id: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Major units; omitted means "whatever remains".
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

/// Checkout sessions, webhook interpretation, and refunds. Every amount
/// sent to the processor derives from the booking's stored price; client
/// hints are logged and discarded.
pub struct PaymentGateway {
    processor: Arc<dyn PaymentProcessor>,
    bookings: Arc<dyn BookingRepository>,
    mailer: Arc<dyn Mailer>,
    config: GatewayConfig,
}

impl PaymentGateway {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        bookings: Arc<dyn BookingRepository>,
        mailer: Arc<dyn Mailer>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            processor,
            bookings,
            mailer,
            config,
        }
    }

    /// Create a hosted checkout session for a booking. The parameters and
    /// the processor idempotency key are persisted on the booking first,
    /// so a later reconciliation retry reuses them verbatim.
    pub async fn create_session(
        &self,
        booking_id: Uuid,
        amount_hint: Option<i64>,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut booking = self.load(booking_id).await?;

        if let Some(hint) = amount_hint {
            if hint != booking.price.amount {
                warn!(
                    booking_ref = %booking.booking_ref,
                    hint,
                    stored = booking.price.amount,
                    "ignoring client amount override"
                );
            }
        }

        let params = SessionParams {
            booking_id: booking.id,
            booking_ref: booking.booking_ref.clone(),
            amount_minor: booking.price.amount_minor(),
            currency: booking.price.currency.clone(),
            success_url: self.config.success_url.clone(),
            cancel_url: self.config.cancel_url.clone(),
            customer_email: booking.contact_email.clone(),
            idempotency_key: format!("checkout-{}-{}", booking.id, Uuid::new_v4().simple()),
        };
        booking.payment.session_params = Some(params.clone());
        self.persist(&booking).await?;

        let session = self
            .processor
            .create_checkout_session(&params)
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;

        booking.payment.session_id = Some(session.id.clone());
        booking.payment.last_payment_link = session.url.clone();
        booking.payment.processor_status = session.payment_status.clone();
        booking.updated_at = Utc::now();
        self.persist(&booking).await?;

        Ok(session)
    }

    /// Recreate a checkout session from the parameters persisted at first
    /// creation. The amount cannot drift because nothing is recomputed.
    pub async fn resend_session(
        &self,
        booking: &mut Booking,
    ) -> Result<CheckoutSession, PaymentError> {
        let params = booking
            .payment
            .session_params
            .clone()
            .ok_or(PaymentError::NoStoredSession)?;

        let session = self
            .processor
            .create_checkout_session(&params)
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;

        booking.payment.session_id = Some(session.id.clone());
        booking.payment.last_payment_link = session.url.clone();
        booking.updated_at = Utc::now();
        self.persist(booking).await?;

        Ok(session)
    }

    /// Interpret a processor webhook delivery. Signature first, then a
    /// tolerant booking resolution, then an idempotent status transition.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentError> {
        match &self.config.webhook_secret {
            Some(secret) => {
                let header = signature.ok_or(PaymentError::InvalidSignature)?;
                if !webhook::verify_signature(secret, header, payload, Utc::now().timestamp()) {
                    return Err(PaymentError::InvalidSignature);
                }
            }
            None => warn!("webhook secret not configured, skipping signature verification"),
        }

        let event: Value = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
        let event_type = event["type"].as_str().unwrap_or("");
        let object = &event["data"]["object"];

        let (session_id, payment_intent_id) = match event_type {
            "checkout.session.completed" => (
                object["id"].as_str().map(String::from),
                object["payment_intent"].as_str().map(String::from),
            ),
            "payment_intent.succeeded" => {
                (None, object["id"].as_str().map(String::from))
            }
            _ => {
                info!(event_type, "ignoring unhandled webhook event");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let Some(mut booking) = self
            .resolve_booking(object, session_id.as_deref(), payment_intent_id.as_deref())
            .await?
        else {
            warn!(event_type, "webhook matched no booking");
            return Ok(WebhookOutcome::Unmatched);
        };

        booking.payment.webhook_deliveries += 1;

        if booking.status != BookingStatus::PendingPayment {
            // Redelivery or a late event for a settled booking: record the
            // delivery, change nothing else.
            let id = booking.id;
            self.persist(&booking).await?;
            return Ok(WebhookOutcome::Duplicate(id));
        }

        if let Some(pi) = &payment_intent_id {
            booking.payment.payment_intent_id = Some(pi.clone());
        }
        if let Some(charge) = object["latest_charge"].as_str() {
            booking.payment.charge_id = Some(charge.to_string());
        }
        booking.payment.processor_status = Some("paid".to_string());
        if booking.ticketing.is_none() {
            booking.ticketing = Some(Ticketing::pending());
        }
        booking.update_status(BookingStatus::Paid);
        self.persist(&booking).await?;

        if let Err(e) = self.mailer.send_booking_confirmation(&booking).await {
            warn!(booking_ref = %booking.booking_ref, error = %e, "confirmation email failed");
        }

        info!(booking_ref = %booking.booking_ref, "payment confirmed via webhook");
        Ok(WebhookOutcome::Confirmed(booking.id))
    }

    /// Refund a paid booking. Any prior refund on the booking, found in
    /// our own records or in the processor's ledger, rejects the call, so
    /// a retried request can never pay out twice.
    pub async fn refund(&self, req: &RefundRequest) -> Result<RefundInfo, PaymentError> {
        let mut booking = match (req.booking_id, &req.booking_ref) {
            (Some(id), _) => self.load(id).await?,
            (None, Some(r)) => self
                .bookings
                .find_by_ref(r)
                .await
                .map_err(|e| PaymentError::Store(e.to_string()))?
                .ok_or(PaymentError::BookingNotFound)?,
            (None, None) => return Err(PaymentError::BookingNotFound),
        };

        let total_minor = booking.price.amount_minor();
        if !booking.refunds.is_empty() {
            return Err(PaymentError::AlreadyRefunded);
        }

        let multiplier = aviro_core::minor_unit_multiplier(&booking.price.currency);
        let requested_minor = req
            .amount
            .map(|a| (a * multiplier).min(total_minor))
            .unwrap_or(total_minor);

        let target = self.resolve_refund_target(&booking, req).await?;

        let prior = self
            .processor
            .list_refunds(&target)
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;
        if prior.iter().any(|r| r.status != "failed") {
            return Err(PaymentError::AlreadyRefunded);
        }

        let refund = self
            .processor
            .create_refund(&target, Some(requested_minor), req.reason.as_deref())
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;

        booking.refunds.push(RefundRecord {
            refund_id: refund.id.clone(),
            amount_minor: refund.amount_minor,
            currency: refund.currency.clone(),
            reason: req.reason.clone(),
            created_at: Utc::now(),
        });
        let status = if booking.refunded_minor_total() >= total_minor {
            BookingStatus::Refunded
        } else {
            BookingStatus::PartiallyRefunded
        };
        booking.update_status(status);
        self.persist(&booking).await?;

        info!(
            booking_ref = %booking.booking_ref,
            refund_id = %refund.id,
            amount_minor = refund.amount_minor,
            "refund created"
        );
        Ok(refund)
    }

    /// Resolution order: explicit charge, explicit intent, the booking's
    /// stored references, then expanding the stored session.
    async fn resolve_refund_target(
        &self,
        booking: &Booking,
        req: &RefundRequest,
    ) -> Result<RefundTarget, PaymentError> {
        if let Some(charge) = &req.charge_id {
            return Ok(RefundTarget::Charge(charge.clone()));
        }
        if let Some(pi) = &req.payment_intent_id {
            return Ok(RefundTarget::PaymentIntent(pi.clone()));
        }
        if let Some(charge) = &booking.payment.charge_id {
            return Ok(RefundTarget::Charge(charge.clone()));
        }
        if let Some(pi) = &booking.payment.payment_intent_id {
            return Ok(RefundTarget::PaymentIntent(pi.clone()));
        }
        if let Some(session_id) = &booking.payment.session_id {
            let session = self
                .processor
                .retrieve_session(session_id)
                .await
                .map_err(|e| PaymentError::Processor(e.to_string()))?;
            if let Some(pi) = session.payment_intent_id {
                let intent = self
                    .processor
                    .retrieve_payment_intent(&pi)
                    .await
                    .map_err(|e| PaymentError::Processor(e.to_string()))?;
                return Ok(match intent.charge_id {
                    Some(charge) => RefundTarget::Charge(charge),
                    None => RefundTarget::PaymentIntent(pi),
                });
            }
        }
        Err(PaymentError::MissingChargeReference)
    }

    async fn resolve_booking(
        &self,
        object: &Value,
        session_id: Option<&str>,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<Booking>, PaymentError> {
        let store_err = |e: Box<dyn std::error::Error + Send + Sync>| {
            PaymentError::Store(e.to_string())
        };

        if let Some(id) = object["metadata"]["booking_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            if let Some(b) = self.bookings.get(id).await.map_err(store_err)? {
                return Ok(Some(b));
            }
        }
        if let Some(r) = object["metadata"]["booking_ref"].as_str() {
            if let Some(b) = self.bookings.find_by_ref(r).await.map_err(store_err)? {
                return Ok(Some(b));
            }
        }
        if let Some(sid) = session_id {
            if let Some(b) = self
                .bookings
                .find_by_session_id(sid)
                .await
                .map_err(store_err)?
            {
                return Ok(Some(b));
            }
        }
        if let Some(pi) = payment_intent_id {
            if let Some(b) = self
                .bookings
                .find_by_payment_intent(pi)
                .await
                .map_err(store_err)?
            {
                return Ok(Some(b));
            }
        }
        Ok(None)
    }

    async fn load(&self, id: Uuid) -> Result<Booking, PaymentError> {
        self.bookings
            .get(id)
            .await
            .map_err(|e| PaymentError::Store(e.to_string()))?
            .ok_or(PaymentError::BookingNotFound)
    }

    async fn persist(&self, booking: &Booking) -> Result<(), PaymentError> {
        self.bookings
            .update(booking)
            .await
            .map_err(|e| PaymentError::Store(e.to_string()))
    }
}
