//! In-process repositories with the same contracts as the Postgres ones.
//! They back the test suites and the `memory` storage mode.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use aviro_core::model::addon::Addon;
use aviro_core::model::booking::Booking;
use aviro_core::model::coupon::Coupon;
use aviro_core::model::flight::Flight;
use aviro_core::model::reconcile::ReconciliationRun;
use aviro_core::repository::{
    AddonRepository, BookingRepository, CouponRepository, FlightRepository, IdempotencyInsert,
    IdempotencyRepository, ReconciliationLogRepository,
};

#[derive(Default)]
pub struct MemoryBookingRepository {
    inner: Mutex<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn insert(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner
            .lock()
            .unwrap()
            .insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.insert(booking).await
    }

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_ref(
        &self,
        booking_ref: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .values()
            .find(|b| b.booking_ref == booking_ref)
            .cloned())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .values()
            .find(|b| b.payment.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .values()
            .find(|b| b.payment.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let mut out: Vec<Booking> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_pending_payment(
        &self,
        limit: i64,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let mut out: Vec<Booking> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.status == aviro_core::BookingStatus::PendingPayment)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn list_awaiting_ticketing(
        &self,
        limit: i64,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let mut out: Vec<Booking> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|b| {
                b.status == aviro_core::BookingStatus::Paid
                    && b.ticketing
                        .as_ref()
                        .map(|t| t.status == aviro_core::TicketingStatus::Pending)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryIdempotencyRepository {
    inner: Mutex<HashMap<String, Uuid>>,
}

impl MemoryIdempotencyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyRepository for MemoryIdempotencyRepository {
    async fn find(
        &self,
        key: &str,
    ) -> Result<Option<Uuid>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().get(key).copied())
    }

    async fn insert(
        &self,
        key: &str,
        booking_id: Uuid,
    ) -> Result<IdempotencyInsert, Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(key) {
            Some(existing) => Ok(IdempotencyInsert::Exists(*existing)),
            None => {
                inner.insert(key.to_string(), booking_id);
                Ok(IdempotencyInsert::Inserted)
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryCouponRepository {
    coupons: Mutex<HashMap<String, Coupon>>,
    redemptions: Mutex<Vec<(String, String)>>,
}

impl MemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, coupon: Coupon) {
        self.coupons
            .lock()
            .unwrap()
            .insert(coupon.code.clone(), coupon);
    }
}

#[async_trait]
impl CouponRepository for MemoryCouponRepository {
    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Coupon>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.coupons.lock().unwrap().get(code).cloned())
    }

    async fn count_user_uses(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .redemptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, u)| c == code && u == user_id)
            .count() as i64)
    }

    async fn increment_usage(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(c) = self.coupons.lock().unwrap().get_mut(code) {
            c.used_count += 1;
        }
        self.redemptions
            .lock()
            .unwrap()
            .push((code.to_string(), user_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAddonRepository {
    addons: Mutex<HashMap<String, Addon>>,
}

impl MemoryAddonRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, addon: Addon) {
        self.addons
            .lock()
            .unwrap()
            .insert(addon.code.clone(), addon);
    }
}

#[async_trait]
impl AddonRepository for MemoryAddonRepository {
    async fn find_active_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<Addon>, Box<dyn std::error::Error + Send + Sync>> {
        let addons = self.addons.lock().unwrap();
        Ok(codes
            .iter()
            .filter_map(|c| addons.get(c))
            .filter(|a| a.active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryFlightRepository {
    flights: Mutex<Vec<Flight>>,
}

impl MemoryFlightRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, flight: Flight) {
        self.flights.lock().unwrap().push(flight);
    }
}

#[async_trait]
impl FlightRepository for MemoryFlightRepository {
    async fn find_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Flight>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .flights
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id.to_string() == id)
            .cloned())
    }

    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Flight>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .flights
            .lock()
            .unwrap()
            .iter()
            .filter(|f| {
                f.origin == origin
                    && f.destination == destination
                    && f.departure_at.date_naive() == date
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryReconciliationLogRepository {
    runs: Mutex<Vec<ReconciliationRun>>,
}

impl MemoryReconciliationLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<ReconciliationRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReconciliationLogRepository for MemoryReconciliationLogRepository {
    async fn insert_run(
        &self,
        run: &ReconciliationRun,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }
}
