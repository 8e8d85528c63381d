use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::model::addon::Addon;
use crate::model::booking::Booking;
use crate::model::coupon::Coupon;
use crate::model::flight::Flight;
use crate::model::reconcile::ReconciliationRun;
use crate::model::seatmap::SeatMap;

/// Repository trait for booking persistence. Lookups by processor
/// references exist because webhook payloads do not always carry our ids.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn update(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_ref(
        &self,
        booking_ref: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>>;

    async fn list_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>>;

    /// Oldest-first page of bookings still awaiting payment.
    async fn list_pending_payment(
        &self,
        limit: i64,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>>;

    /// Paid bookings whose ticketing is still pending.
    async fn list_awaiting_ticketing(
        &self,
        limit: i64,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Seat map saves are compare-and-swap: the caller passes the version it
/// loaded, and the store refuses the write if anyone else got there first.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("seat map was modified concurrently")]
    Conflict,
    #[error("storage error: {0}")]
    Other(String),
}

#[async_trait]
pub trait SeatMapStore: Send + Sync {
    /// Lookup by canonical flight id, legacy id, or alias.
    async fn find_by_key(
        &self,
        key: &str,
    ) -> Result<Option<SeatMap>, Box<dyn std::error::Error + Send + Sync>>;

    /// Persist `map` if the stored version still equals `expected_version`;
    /// the stored version becomes `expected_version + 1`.
    async fn save(&self, map: &SeatMap, expected_version: u64) -> Result<(), SaveError>;
}

/// Outcome of an idempotency-key insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyInsert {
    Inserted,
    /// The key was already claimed, by the booking returned here.
    Exists(Uuid),
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find(
        &self,
        key: &str,
    ) -> Result<Option<Uuid>, Box<dyn std::error::Error + Send + Sync>>;

    /// Insert-or-fail; never overwrites an existing mapping.
    async fn insert(
        &self,
        key: &str,
        booking_id: Uuid,
    ) -> Result<IdempotencyInsert, Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Coupon>, Box<dyn std::error::Error + Send + Sync>>;

    /// How many times this user already redeemed the code.
    async fn count_user_uses(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>>;

    /// Best-effort redemption counter bump.
    async fn increment_usage(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
pub trait AddonRepository: Send + Sync {
    async fn find_active_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<Addon>, Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Flight>, Box<dyn std::error::Error + Send + Sync>>;

    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Flight>, Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
pub trait ReconciliationLogRepository: Send + Sync {
    async fn insert_run(
        &self,
        run: &ReconciliationRun,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
