use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use aviro_core::model::booking::{Booking, BookingStatus, Ticketing, TicketingStatus};
use aviro_core::model::reconcile::{ReconcileEntry, ReconcileOutcome, ReconciliationRun};
use aviro_core::notify::Mailer;
use aviro_core::payment::PaymentProcessor;
use aviro_core::provider::AirlineProvider;
use aviro_core::repository::{BookingRepository, ReconciliationLogRepository};
use aviro_inventory::SeatInventory;
use aviro_payments::{PaymentError, PaymentGateway};

/// Give up on a payment after this many resend attempts.
pub const MAX_RETRIES: u32 = 5;
/// ...or once the booking is this old, whichever comes first.
pub const MAX_RETRY_DAYS: i64 = 3;
/// Exponential backoff between attempts, in minutes.
pub const BASE_DELAY_MIN: i64 = 5;
pub const MAX_DELAY_MIN: i64 = 60;
/// Ticket issuance gets fewer tries; the GDS side is not idempotent.
pub const MAX_TICKET_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage error: {0}")]
    Store(String),
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub limit: i64,
    /// Report what a sweep would do without touching anything.
    pub dry_run: bool,
    pub run_by: String,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            dry_run: false,
            run_by: "scheduler".to_string(),
        }
    }
}

/// Periodic sweep over stuck bookings: expire stale unpaid ones, nudge
/// the rest with a fresh payment link, and push paid bookings through
/// ticket issuance. Every booking is handled in isolation so one bad row
/// cannot stall the sweep.
pub struct ReconciliationEngine {
    bookings: Arc<dyn BookingRepository>,
    processor: Arc<dyn PaymentProcessor>,
    gateway: Arc<PaymentGateway>,
    inventory: Arc<SeatInventory>,
    provider: Arc<dyn AirlineProvider>,
    mailer: Arc<dyn Mailer>,
    logs: Arc<dyn ReconciliationLogRepository>,
}

impl ReconciliationEngine {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        processor: Arc<dyn PaymentProcessor>,
        gateway: Arc<PaymentGateway>,
        inventory: Arc<SeatInventory>,
        provider: Arc<dyn AirlineProvider>,
        mailer: Arc<dyn Mailer>,
        logs: Arc<dyn ReconciliationLogRepository>,
    ) -> Self {
        Self {
            bookings,
            processor,
            gateway,
            inventory,
            provider,
            mailer,
            logs,
        }
    }

    pub async fn reconcile_once(
        &self,
        opts: &ReconcileOptions,
    ) -> Result<ReconciliationRun, ReconcileError> {
        let started_at = Utc::now();
        let mut run = ReconciliationRun {
            id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            run_by: opts.run_by.clone(),
            dry_run: opts.dry_run,
            scanned: 0,
            retried: 0,
            expired: 0,
            skipped: 0,
            errors: 0,
            entries: Vec::new(),
        };

        let pending = self
            .bookings
            .list_pending_payment(opts.limit)
            .await
            .map_err(|e| ReconcileError::Store(e.to_string()))?;
        run.scanned += pending.len() as u32;
        for booking in pending {
            let entry = self.reconcile_payment(booking, opts).await;
            run.record(entry);
        }

        let awaiting = self
            .bookings
            .list_awaiting_ticketing(opts.limit)
            .await
            .map_err(|e| ReconcileError::Store(e.to_string()))?;
        run.scanned += awaiting.len() as u32;
        for booking in awaiting {
            let entry = self.reconcile_ticketing(booking, opts).await;
            run.record(entry);
        }

        run.finished_at = Utc::now();
        if let Err(e) = self.logs.insert_run(&run).await {
            warn!(error = %e, "failed to persist reconciliation log");
        }
        info!(
            run_id = %run.id,
            scanned = run.scanned,
            retried = run.retried,
            expired = run.expired,
            skipped = run.skipped,
            errors = run.errors,
            dry_run = run.dry_run,
            "reconciliation sweep finished"
        );
        Ok(run)
    }

    async fn reconcile_payment(
        &self,
        mut booking: Booking,
        opts: &ReconcileOptions,
    ) -> ReconcileEntry {
        let before = booking.status;
        let entry = |booking: &Booking, outcome, detail: &str| ReconcileEntry {
            booking_id: booking.id,
            booking_ref: booking.booking_ref.clone(),
            status_before: before,
            status_after: booking.status,
            outcome,
            detail: Some(detail.to_string()),
        };
        let now = Utc::now();

        // Hard expiry: too old or out of attempts.
        let too_old = now - booking.created_at > Duration::days(MAX_RETRY_DAYS);
        let out_of_attempts = booking.payment.attempts >= MAX_RETRIES;
        if too_old || out_of_attempts {
            let detail = if too_old { "age limit" } else { "retry limit" };
            if opts.dry_run {
                return entry(&booking, ReconcileOutcome::Expired, detail);
            }
            booking.update_status(BookingStatus::PaymentExpired);
            if let Err(e) = self.bookings.update(&booking).await {
                return entry(&booking, ReconcileOutcome::Error, &e.to_string());
            }
            let report = self.inventory.restore(&booking).await;
            if !report.ok {
                warn!(booking_ref = %booking.booking_ref, "seats not restored on expiry");
            }
            return entry(&booking, ReconcileOutcome::Expired, detail);
        }

        // Backoff gate: 5, 10, 20, 40 minutes, capped at 60.
        if let Some(last) = booking.payment.last_attempt_at {
            let exp = booking.payment.attempts.min(10);
            let delay = (BASE_DELAY_MIN << exp).min(MAX_DELAY_MIN);
            if now < last + Duration::minutes(delay) {
                return entry(&booking, ReconcileOutcome::Skipped, "backoff");
            }
        }

        // The customer may have paid while we were not looking.
        if let Some(session_id) = booking.payment.session_id.clone() {
            match self.processor.retrieve_session(&session_id).await {
                Ok(session) if session.payment_status.as_deref() == Some("paid") => {
                    if opts.dry_run {
                        return entry(&booking, ReconcileOutcome::Retried, "would settle");
                    }
                    booking.payment.payment_intent_id =
                        session.payment_intent_id.or(booking.payment.payment_intent_id.take());
                    booking.payment.processor_status = Some("paid".to_string());
                    if booking.ticketing.is_none() {
                        booking.ticketing = Some(Ticketing::pending());
                    }
                    booking.update_status(BookingStatus::Paid);
                    if let Err(e) = self.bookings.update(&booking).await {
                        return entry(&booking, ReconcileOutcome::Error, &e.to_string());
                    }
                    if let Err(e) = self.mailer.send_booking_confirmation(&booking).await {
                        warn!(booking_ref = %booking.booking_ref, error = %e, "confirmation email failed");
                    }
                    return entry(&booking, ReconcileOutcome::Retried, "payment found settled");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(booking_ref = %booking.booking_ref, error = %e, "session lookup failed");
                }
            }
        }

        if opts.dry_run {
            return entry(&booking, ReconcileOutcome::Retried, "would resend link");
        }

        // Resend from the persisted parameters so the amount cannot drift;
        // a booking that never had a session gets a fresh one.
        let session = match self.gateway.resend_session(&mut booking).await {
            Ok(s) => Ok(s),
            Err(PaymentError::NoStoredSession) => {
                self.gateway.create_session(booking.id, None).await
            }
            Err(e) => Err(e),
        };
        let session = match session {
            Ok(s) => s,
            Err(e) => return entry(&booking, ReconcileOutcome::Error, &e.to_string()),
        };
        // resend/create persisted their own fields; reload to stack the
        // attempt counter on top of them.
        booking = match self.bookings.get(booking.id).await {
            Ok(Some(b)) => b,
            Ok(None) => return entry(&booking, ReconcileOutcome::Error, "booking vanished"),
            Err(e) => return entry(&booking, ReconcileOutcome::Error, &e.to_string()),
        };
        booking.payment.attempts += 1;
        booking.payment.last_attempt_at = Some(now);
        booking.updated_at = now;
        if let Err(e) = self.bookings.update(&booking).await {
            return entry(&booking, ReconcileOutcome::Error, &e.to_string());
        }

        if let Some(url) = session.url.as_deref() {
            if let Err(e) = self.mailer.send_payment_link(&booking, url).await {
                warn!(booking_ref = %booking.booking_ref, error = %e, "payment link email failed");
            }
        }
        entry(&booking, ReconcileOutcome::Retried, "payment link resent")
    }

    async fn reconcile_ticketing(
        &self,
        mut booking: Booking,
        opts: &ReconcileOptions,
    ) -> ReconcileEntry {
        let before = booking.status;
        let entry = |booking: &Booking, outcome, detail: &str| ReconcileEntry {
            booking_id: booking.id,
            booking_ref: booking.booking_ref.clone(),
            status_before: before,
            status_after: booking.status,
            outcome,
            detail: Some(detail.to_string()),
        };

        let Some(mut ticketing) = booking.ticketing.clone() else {
            return entry(&booking, ReconcileOutcome::Skipped, "no ticketing state");
        };
        if ticketing.status != TicketingStatus::Pending {
            return entry(&booking, ReconcileOutcome::Skipped, "ticketing settled");
        }
        if ticketing.attempts >= MAX_TICKET_RETRIES {
            if opts.dry_run {
                return entry(&booking, ReconcileOutcome::Expired, "ticket retry limit");
            }
            ticketing.status = TicketingStatus::Failed;
            ticketing.updated_at = Utc::now();
            booking.ticketing = Some(ticketing);
            booking.update_status(BookingStatus::TicketingFailed);
            if let Err(e) = self.bookings.update(&booking).await {
                return entry(&booking, ReconcileOutcome::Error, &e.to_string());
            }
            return entry(&booking, ReconcileOutcome::Expired, "ticket retry limit");
        }
        if opts.dry_run {
            return entry(&booking, ReconcileOutcome::Retried, "would issue ticket");
        }

        // Count the attempt before calling out: if we crash mid-issue, the
        // booking must not be retried forever.
        ticketing.attempts += 1;
        ticketing.updated_at = Utc::now();
        booking.ticketing = Some(ticketing.clone());
        if let Err(e) = self.bookings.update(&booking).await {
            return entry(&booking, ReconcileOutcome::Error, &e.to_string());
        }

        match self.provider.issue_ticket(&booking).await {
            Ok(issue) => {
                ticketing.status = TicketingStatus::Issued;
                ticketing.pnr = Some(issue.pnr.clone());
                ticketing.last_error = None;
                ticketing.updated_at = Utc::now();
                booking.ticketing = Some(ticketing);
                booking.provider_pnr = Some(issue.pnr);
                booking.update_status(BookingStatus::Ticketed);
                if let Err(e) = self.bookings.update(&booking).await {
                    return entry(&booking, ReconcileOutcome::Error, &e.to_string());
                }
                entry(&booking, ReconcileOutcome::Retried, "ticket issued")
            }
            Err(e) => {
                ticketing.last_error = Some(e.to_string());
                let exhausted = ticketing.attempts >= MAX_TICKET_RETRIES;
                if exhausted {
                    ticketing.status = TicketingStatus::Failed;
                    booking.update_status(BookingStatus::TicketingFailed);
                }
                ticketing.updated_at = Utc::now();
                booking.ticketing = Some(ticketing);
                if let Err(persist) = self.bookings.update(&booking).await {
                    return entry(&booking, ReconcileOutcome::Error, &persist.to_string());
                }
                entry(&booking, ReconcileOutcome::Error, &e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aviro_core::model::booking::{BookingPrice, BookingSeat, PaymentInfo};
    use aviro_core::model::seatmap::{Seat, SeatMap, SeatState};
    use aviro_core::notify::NoopMailer;
    use aviro_inventory::MemorySeatMapStore;
    use aviro_payments::{GatewayConfig, MockProcessor};
    use aviro_store::memory::{MemoryBookingRepository, MemoryReconciliationLogRepository};

    use crate::mock::MockAirlineProvider;

    struct Env {
        engine: ReconciliationEngine,
        gateway: Arc<PaymentGateway>,
        bookings: Arc<MemoryBookingRepository>,
        seat_maps: Arc<MemorySeatMapStore>,
        inventory: Arc<SeatInventory>,
        processor: Arc<MockProcessor>,
        provider: Arc<MockAirlineProvider>,
        logs: Arc<MemoryReconciliationLogRepository>,
    }

    fn env() -> Env {
        let bookings = Arc::new(MemoryBookingRepository::new());
        let seat_maps = Arc::new(MemorySeatMapStore::new());
        let processor = Arc::new(MockProcessor::new());
        let provider = Arc::new(MockAirlineProvider::new());
        let mailer = Arc::new(NoopMailer);
        let logs = Arc::new(MemoryReconciliationLogRepository::new());

        let inventory = Arc::new(SeatInventory::new(seat_maps.clone()));
        let gateway = Arc::new(PaymentGateway::new(
            processor.clone(),
            bookings.clone(),
            mailer.clone(),
            GatewayConfig {
                webhook_secret: None,
                success_url: "https://shop.test/success".into(),
                cancel_url: "https://shop.test/cancel".into(),
            },
        ));
        let engine = ReconciliationEngine::new(
            bookings.clone(),
            processor.clone(),
            gateway.clone(),
            inventory.clone(),
            provider.clone(),
            mailer,
            logs.clone(),
        );

        Env {
            engine,
            gateway,
            bookings,
            seat_maps,
            inventory,
            processor,
            provider,
            logs,
        }
    }

    fn pending_booking(flight_id: &str, amount: i64) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            booking_ref: "KTEST01-AB12CD".into(),
            user_id: "user-1".into(),
            contact_email: Some("user@example.test".into()),
            flight_id: flight_id.into(),
            airline: None,
            seats: vec![BookingSeat {
                seat_id: "12A".into(),
                label: None,
                cabin: None,
                price: amount,
                price_source: "seat-map".into(),
            }],
            passengers: Vec::new(),
            addons: Vec::new(),
            discounts: Vec::new(),
            coupons: Vec::new(),
            price: BookingPrice {
                seats_total: amount,
                addons_total: 0,
                discount_total: 0,
                taxable: amount,
                tax: 0,
                amount,
                currency: "usd".into(),
            },
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
        }
    }

    async fn insert(env: &Env, booking: &Booking) {
        env.bookings.insert(booking).await.unwrap();
    }

    #[tokio::test]
    async fn age_limit_expires_and_restores_seats() {
        let env = env();
        env.seat_maps
            .seed(SeatMap::new("FL-100", vec![Seat::free("12A")]));
        env.inventory
            .confirm("FL-100", &["12A".to_string()], "user-1")
            .await
            .unwrap();

        let mut booking = pending_booking("FL-100", 2_000);
        booking.created_at = Utc::now() - Duration::days(MAX_RETRY_DAYS + 1);
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.expired, 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::PaymentExpired);
        let map = env.inventory.get("FL-100").await.unwrap();
        assert_eq!(map.seat("12A").unwrap().state, SeatState::Free);
    }

    #[tokio::test]
    async fn retry_limit_expires_the_booking() {
        let env = env();
        let mut booking = pending_booking("FL-100", 2_000);
        booking.payment.attempts = MAX_RETRIES;
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.expired, 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::PaymentExpired);
    }

    #[tokio::test]
    async fn recent_attempt_is_skipped_by_backoff() {
        let env = env();
        let mut booking = pending_booking("FL-100", 2_000);
        booking.payment.attempts = 1;
        booking.payment.last_attempt_at = Some(Utc::now() - Duration::minutes(2));
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.skipped, 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.attempts, 1);
        assert_eq!(stored.status, BookingStatus::PendingPayment);
    }

    #[tokio::test]
    async fn attempt_older_than_the_backoff_window_is_retried() {
        let env = env();
        let mut booking = pending_booking("FL-100", 2_000);
        booking.payment.last_attempt_at = Some(Utc::now() - Duration::minutes(6));
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        // attempts=0 means a 5 minute window, which has passed.
        assert_eq!(run.retried, 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.attempts, 1);
    }

    #[tokio::test]
    async fn settled_session_is_promoted_to_paid() {
        let env = env();
        let booking = pending_booking("FL-100", 2_000);
        insert(&env, &booking).await;
        let session = env.gateway.create_session(booking.id, None).await.unwrap();
        env.processor.mark_paid(&session.id);

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.retried, 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Paid);
        assert!(stored.payment.payment_intent_id.is_some());
        assert_eq!(
            stored.ticketing.as_ref().map(|t| t.status),
            Some(TicketingStatus::Pending)
        );
        // No resend happened, so only the original session exists.
        assert_eq!(env.processor.created_params().len(), 1);
    }

    #[tokio::test]
    async fn unpaid_session_is_resent_from_stored_params() {
        let env = env();
        let booking = pending_booking("FL-100", 2_000);
        insert(&env, &booking).await;
        env.gateway.create_session(booking.id, None).await.unwrap();

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.retried, 1);
        let params = env.processor.created_params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], params[1]);

        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::PendingPayment);
        assert_eq!(stored.payment.attempts, 1);
        assert!(stored.payment.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn booking_without_a_session_gets_a_fresh_one() {
        let env = env();
        let booking = pending_booking("FL-100", 2_000);
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.retried, 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert!(stored.payment.session_id.is_some());
        assert_eq!(stored.payment.attempts, 1);
    }

    #[tokio::test]
    async fn pending_tickets_are_issued() {
        let env = env();
        let mut booking = pending_booking("FL-100", 2_000);
        booking.status = BookingStatus::Paid;
        booking.ticketing = Some(Ticketing::pending());
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.retried, 1);
        assert_eq!(env.provider.ticket_calls(), 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Ticketed);
        let ticketing = stored.ticketing.unwrap();
        assert_eq!(ticketing.status, TicketingStatus::Issued);
        assert!(ticketing.pnr.is_some());
        assert_eq!(ticketing.attempts, 1);
    }

    #[tokio::test]
    async fn ticket_failure_is_recorded_and_eventually_exhausted() {
        let env = env();
        env.provider.set_fail_ticketing(true);
        let mut booking = pending_booking("FL-100", 2_000);
        booking.status = BookingStatus::Paid;
        let mut ticketing = Ticketing::pending();
        ticketing.attempts = MAX_TICKET_RETRIES - 1;
        booking.ticketing = Some(ticketing);
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.errors, 1);
        assert_eq!(env.provider.ticket_calls(), 1);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::TicketingFailed);
        let ticketing = stored.ticketing.unwrap();
        assert_eq!(ticketing.status, TicketingStatus::Failed);
        assert_eq!(ticketing.attempts, MAX_TICKET_RETRIES);
        assert!(ticketing.last_error.is_some());
    }

    #[tokio::test]
    async fn exhausted_tickets_fail_without_calling_the_provider() {
        let env = env();
        let mut booking = pending_booking("FL-100", 2_000);
        booking.status = BookingStatus::Paid;
        let mut ticketing = Ticketing::pending();
        ticketing.attempts = MAX_TICKET_RETRIES;
        booking.ticketing = Some(ticketing);
        insert(&env, &booking).await;

        let run = env.engine.reconcile_once(&ReconcileOptions::default()).await.unwrap();

        assert_eq!(run.expired, 1);
        assert_eq!(env.provider.ticket_calls(), 0);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::TicketingFailed);
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let env = env();
        let mut booking = pending_booking("FL-100", 2_000);
        booking.created_at = Utc::now() - Duration::days(MAX_RETRY_DAYS + 1);
        insert(&env, &booking).await;

        let opts = ReconcileOptions {
            dry_run: true,
            ..ReconcileOptions::default()
        };
        let run = env.engine.reconcile_once(&opts).await.unwrap();

        assert_eq!(run.expired, 1);
        assert!(run.dry_run);
        let stored = env.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::PendingPayment);
        // The sweep itself is still logged.
        assert_eq!(env.logs.runs().len(), 1);
    }
}
