use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use aviro_core::model::seatmap::SeatMap;
use aviro_core::repository::{SaveError, SeatMapStore};

/// In-process seat map store with the same compare-and-swap contract as
/// the database-backed one. Used by tests and single-node development.
pub struct MemorySeatMapStore {
    maps: Mutex<HashMap<Uuid, SeatMap>>,
}

impl MemorySeatMapStore {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed(&self, map: SeatMap) {
        self.maps.lock().unwrap().insert(map.id, map);
    }
}

impl Default for MemorySeatMapStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeatMapStore for MemorySeatMapStore {
    async fn find_by_key(
        &self,
        key: &str,
    ) -> Result<Option<SeatMap>, Box<dyn std::error::Error + Send + Sync>> {
        let maps = self.maps.lock().unwrap();
        Ok(maps.values().find(|m| m.matches_key(key)).cloned())
    }

    async fn save(&self, map: &SeatMap, expected_version: u64) -> Result<(), SaveError> {
        let mut maps = self.maps.lock().unwrap();
        match maps.get(&map.id) {
            Some(stored) if stored.version != expected_version => Err(SaveError::Conflict),
            Some(_) | None => {
                let mut next = map.clone();
                next.version = expected_version + 1;
                maps.insert(next.id, next);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use aviro_core::model::booking::{
        Booking, BookingPrice, BookingStatus, PaymentInfo,
    };
    use aviro_core::model::seatmap::Seat;
    use chrono::Utc;

    pub fn booking_fixture(flight_id: &str) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            booking_ref: "TESTREF".into(),
            user_id: "u1".into(),
            contact_email: None,
            flight_id: flight_id.into(),
            airline: None,
            passengers: Vec::new(),
            seats: Vec::new(),
            addons: Vec::new(),
            discounts: Vec::new(),
            coupons: Vec::new(),
            price: BookingPrice {
                seats_total: 0,
                addons_total: 0,
                discount_total: 0,
                taxable: 0,
                tax: 0,
                amount: 0,
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

    #[tokio::test]
    async fn save_with_stale_version_conflicts() {
        let store = MemorySeatMapStore::new();
        let map = SeatMap::new("FL-1", vec![Seat::free("1A")]);
        store.seed(map.clone());

        store.save(&map, 0).await.unwrap();
        let err = store.save(&map, 0).await.unwrap_err();
        assert!(matches!(err, SaveError::Conflict));
    }

    #[tokio::test]
    async fn lookup_by_alias() {
        let store = MemorySeatMapStore::new();
        let mut map = SeatMap::new("FL-1", vec![Seat::free("1A")]);
        map.aliases.push("LEGACY-9".into());
        store.seed(map);

        assert!(store.find_by_key("LEGACY-9").await.unwrap().is_some());
        assert!(store.find_by_key("NOPE").await.unwrap().is_none());
    }
}
