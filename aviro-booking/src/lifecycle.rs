use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use aviro_core::model::booking::{Booking, BookingStatus, Passenger, PaymentInfo};
use aviro_core::notify::Mailer;
use aviro_core::provider::AirlineProvider;
use aviro_core::repository::{
    AddonRepository, BookingRepository, CouponRepository, FlightRepository, IdempotencyInsert,
    IdempotencyRepository,
};
use aviro_inventory::{SeatError, SeatInventory};
use aviro_payments::{PaymentGateway, RefundRequest};
use aviro_pricing::{
    round_div, AddonSelection, CouponInput, DiscountInput, PricingEngine, PricingError,
    QuoteRequest, ResolvedAddon, ResolvedCoupon, SeatSelection,
};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Seat(#[from] SeatError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("booking not found")]
    NotFound,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error("booking cancelled but refund failed: {0}")]
    RefundFailed(String),
    #[error("storage error: {0}")]
    Store(String),
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Cancellation fee in basis points of the booking total.
    pub cancellation_fee_bp: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cancellation_fee_bp: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    pub flight_id: String,
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub passengers: Vec<Passenger>,
    pub seats: Vec<SeatSelection>,
    #[serde(default)]
    pub addons: Vec<AddonSelection>,
    #[serde(default)]
    pub discounts: Vec<DiscountInput>,
    #[serde(default)]
    pub coupons: Vec<CouponInput>,
}

/// How a cancellation should behave. Both switches default to on; an
/// operator can keep the money or the seats by turning one off.
#[derive(Debug, Clone)]
pub struct CancelOptions {
    pub reason: Option<String>,
    pub refund: bool,
    pub restore_inventory: bool,
}

impl Default for CancelOptions {
    fn default() -> Self {
        Self {
            reason: None,
            refund: true,
            restore_inventory: true,
        }
    }
}

/// Booking creation and cancellation. Creation prices first and commits
/// seats last, so a failed quote never strands inventory; cancellation
/// commits the cancelled state before attempting the refund.
pub struct BookingLifecycle {
    bookings: Arc<dyn BookingRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
    coupons: Arc<dyn CouponRepository>,
    addons: Arc<dyn AddonRepository>,
    flights: Arc<dyn FlightRepository>,
    inventory: Arc<SeatInventory>,
    pricing: PricingEngine,
    gateway: Arc<PaymentGateway>,
    provider: Arc<dyn AirlineProvider>,
    mailer: Arc<dyn Mailer>,
    config: LifecycleConfig,
}

impl BookingLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
        coupons: Arc<dyn CouponRepository>,
        addons: Arc<dyn AddonRepository>,
        flights: Arc<dyn FlightRepository>,
        inventory: Arc<SeatInventory>,
        pricing: PricingEngine,
        gateway: Arc<PaymentGateway>,
        provider: Arc<dyn AirlineProvider>,
        mailer: Arc<dyn Mailer>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            bookings,
            idempotency,
            coupons,
            addons,
            flights,
            inventory,
            pricing,
            gateway,
            provider,
            mailer,
            config,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(id)
            .await
            .map_err(|e| BookingError::Store(e.to_string()))?
            .ok_or(BookingError::NotFound)
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        self.bookings
            .list_by_user(user_id)
            .await
            .map_err(|e| BookingError::Store(e.to_string()))
    }

    pub async fn create(
        &self,
        req: &CreateBookingRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Booking, BookingError> {
        if req.user_id.trim().is_empty() {
            return Err(BookingError::InvalidInput("user_id is required".into()));
        }
        if req.flight_id.trim().is_empty() {
            return Err(BookingError::InvalidInput("flight_id is required".into()));
        }
        if req.seats.is_empty() {
            return Err(BookingError::InvalidInput(
                "at least one seat is required".into(),
            ));
        }

        if let Some(key) = idempotency_key {
            if let Some(existing_id) = self
                .idempotency
                .find(key)
                .await
                .map_err(|e| BookingError::Store(e.to_string()))?
            {
                info!(%key, booking_id = %existing_id, "idempotent replay, returning existing booking");
                return self.get(existing_id).await;
            }
        }

        let flight = self
            .flights
            .find_by_id(&req.flight_id)
            .await
            .map_err(|e| BookingError::Store(e.to_string()))?;

        // A flight without a seat map is still bookable; we just lose seat
        // tracking for it.
        let seat_map = match self.inventory.get(&req.flight_id).await {
            Ok(map) => Some(map),
            Err(SeatError::MapNotFound(_)) => {
                warn!(flight = %req.flight_id, "no seat map, booking without seat tracking");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let airline = req
            .airline
            .clone()
            .or_else(|| flight.as_ref().map(|f| f.airline.clone()));

        let addon_codes: Vec<String> = req.addons.iter().map(|a| a.code.clone()).collect();
        let canonical_addons = self
            .addons
            .find_active_by_codes(&addon_codes)
            .await
            .map_err(|e| BookingError::Store(e.to_string()))?;
        // Unknown codes vanish here; a line survives only with a canonical
        // counterpart.
        let addons: Vec<ResolvedAddon> = req
            .addons
            .iter()
            .filter_map(|sel| {
                canonical_addons
                    .iter()
                    .find(|a| a.code == sel.code)
                    .map(|a| ResolvedAddon {
                        addon: a.clone(),
                        qty: sel.qty.max(1),
                    })
            })
            .collect();

        let mut resolved_coupons = Vec::with_capacity(req.coupons.len());
        for input in &req.coupons {
            let coupon = self
                .coupons
                .find_by_code(input.code())
                .await
                .map_err(|e| BookingError::Store(e.to_string()))?;
            let user_uses = self
                .coupons
                .count_user_uses(input.code(), &req.user_id)
                .await
                .map_err(|e| BookingError::Store(e.to_string()))?;
            resolved_coupons.push(ResolvedCoupon {
                input: input.clone(),
                coupon,
                user_uses,
            });
        }

        let currency = flight
            .as_ref()
            .map(|f| f.price.currency.clone())
            .unwrap_or_else(|| "usd".to_string());

        let quote = self.pricing.quote(&QuoteRequest {
            flight: flight.as_ref(),
            seat_map: seat_map.as_ref(),
            seats: &req.seats,
            addons: &addons,
            discounts: &req.discounts,
            coupons: &resolved_coupons,
            airline: airline.as_deref(),
            currency: &currency,
            now: Utc::now(),
        })?;

        // Price is settled; now take the seats.
        if seat_map.is_some() {
            let seat_ids: Vec<String> = req.seats.iter().map(|s| s.seat_id.clone()).collect();
            self.inventory
                .confirm(&req.flight_id, &seat_ids, &req.user_id)
                .await?;
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            booking_ref: generate_booking_ref(),
            user_id: req.user_id.clone(),
            contact_email: req.contact_email.clone(),
            flight_id: req.flight_id.clone(),
            airline,
            passengers: req.passengers.clone(),
            seats: quote.seats,
            addons: quote.addons,
            discounts: quote.discounts,
            coupons: quote.coupons,
            price: quote.price,
            status: BookingStatus::PendingPayment,
            payment: PaymentInfo::default(),
            ticketing: None,
            refunds: Vec::new(),
            cancellation_fee: None,
            cancelled_at: None,
            provider: None,
            provider_booking_id: None,
            provider_pnr: None,
            raw_provider_response: None,
            created_at: now,
            updated_at: now,
        };
        self.bookings
            .insert(&booking)
            .await
            .map_err(|e| BookingError::Store(e.to_string()))?;

        if let Some(key) = idempotency_key {
            match self
                .idempotency
                .insert(key, booking.id)
                .await
                .map_err(|e| BookingError::Store(e.to_string()))?
            {
                IdempotencyInsert::Inserted => {}
                IdempotencyInsert::Exists(winner) => {
                    // Lost the race: undo our copy and hand back the winner.
                    warn!(%key, loser = %booking.id, %winner, "idempotency race, discarding duplicate");
                    let report = self.inventory.restore(&booking).await;
                    if !report.ok {
                        warn!(booking = %booking.booking_ref, "could not free duplicate's seats");
                    }
                    let mut duplicate = booking;
                    duplicate.update_status(BookingStatus::Cancelled);
                    if let Err(e) = self.bookings.update(&duplicate).await {
                        warn!(error = %e, "failed to mark duplicate booking cancelled");
                    }
                    return self.get(winner).await;
                }
            }
        }

        for applied in booking.coupons.iter().filter(|c| c.validated) {
            if let Err(e) = self
                .coupons
                .increment_usage(&applied.code, &booking.user_id)
                .await
            {
                warn!(code = %applied.code, error = %e, "coupon usage bump failed");
            }
        }

        let booking = self.book_with_provider(booking).await;

        info!(
            booking_ref = %booking.booking_ref,
            amount = booking.price.amount,
            currency = %booking.price.currency,
            "booking created"
        );
        Ok(booking)
    }

    /// Provider booking is best-effort at creation time: a GDS outage must
    /// not lose the sale.
    async fn book_with_provider(&self, mut booking: Booking) -> Booking {
        match self.provider.book_flight(&booking).await {
            Ok(pb) => {
                booking.provider = Some(self.provider.name().to_string());
                booking.provider_booking_id = Some(pb.booking_id);
                booking.provider_pnr = pb.pnr;
                booking.raw_provider_response = Some(pb.raw);
                booking.updated_at = Utc::now();
                if let Err(e) = self.bookings.update(&booking).await {
                    warn!(error = %e, "failed to persist provider booking details");
                }
            }
            Err(e) => {
                warn!(booking_ref = %booking.booking_ref, error = %e, "provider booking failed");
            }
        }
        booking
    }

    /// Cancel a booking, charging a percentage fee. The cancelled state is
    /// committed before any refund, so a processor outage can never
    /// resurrect the booking.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        opts: CancelOptions,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.get(booking_id).await?;
        if booking.status.is_cancelled() {
            return Err(BookingError::AlreadyCancelled);
        }

        let fee = round_div(
            booking.price.amount * self.config.cancellation_fee_bp,
            10_000,
        );
        let refund_amount = (booking.price.amount - fee).max(0);
        let refunding = opts.refund && booking.status.is_paid() && refund_amount > 0;

        booking.cancellation_fee = Some(fee);
        booking.cancelled_at = Some(Utc::now());
        booking.update_status(if refunding {
            BookingStatus::CancelledPendingRefund
        } else {
            BookingStatus::Cancelled
        });
        self.bookings
            .update(&booking)
            .await
            .map_err(|e| BookingError::Store(e.to_string()))?;

        if opts.restore_inventory {
            let report = self.inventory.restore(&booking).await;
            if !report.not_found.is_empty() {
                warn!(
                    booking_ref = %booking.booking_ref,
                    missing = ?report.not_found,
                    "some seats could not be restored"
                );
            }
        }

        if let Err(e) = self.mailer.send_cancellation_notice(&booking).await {
            warn!(booking_ref = %booking.booking_ref, error = %e, "cancellation notice failed");
        }

        if refunding {
            let req = RefundRequest {
                booking_id: Some(booking.id),
                amount: Some(refund_amount),
                reason: opts.reason.or_else(|| Some("booking cancelled".to_string())),
                ..RefundRequest::default()
            };
            if let Err(e) = self.gateway.refund(&req).await {
                // The booking stays cancelled-pending-refund for the
                // reconciler or an operator to settle.
                warn!(booking_ref = %booking.booking_ref, error = %e, "cancellation refund failed");
                return Err(BookingError::RefundFailed(e.to_string()));
            }
        }

        info!(booking_ref = %booking.booking_ref, fee, "booking cancelled");
        self.get(booking_id).await
    }
}

/// Human-facing reference: millisecond timestamp in base36 plus a short
/// random suffix, uppercased.
pub(crate) fn generate_booking_ref() -> String {
    let mut millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut stamp = Vec::new();
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if millis == 0 {
        stamp.push(b'0');
    }
    while millis > 0 {
        stamp.push(DIGITS[(millis % 36) as usize]);
        millis /= 36;
    }
    stamp.reverse();
    let suffix: [u8; 3] = rand::thread_rng().gen();
    format!(
        "{}-{:02x}{:02x}{:02x}",
        String::from_utf8_lossy(&stamp),
        suffix[0],
        suffix[1],
        suffix[2]
    )
    .to_uppercase()
}
