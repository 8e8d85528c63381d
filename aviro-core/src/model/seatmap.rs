use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seat occupancy state machine: FREE -> HELD -> BOOKED, with HELD -> FREE
/// on release or expiry and BOOKED -> FREE only through restore.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Free,
    Held,
    Booked,
}

/// A time-boxed hold placed by one holder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatHold {
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: String,
    pub cabin: Option<String>,
    pub state: SeatState,
    pub hold: Option<SeatHold>,
    /// Absolute price in major units, when the map carries one.
    pub price: Option<i64>,
    pub price_modifier: Option<i64>,
}

impl Seat {
    pub fn free(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cabin: None,
            state: SeatState::Free,
            hold: None,
            price: None,
            price_modifier: None,
        }
    }
}

/// Display/pricing metadata kept separately from occupancy, so a booking can
/// reference seats by label even when the map layout drifted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMeta {
    pub seat_id: String,
    pub label: Option<String>,
    pub cabin: Option<String>,
    pub price: Option<i64>,
    pub price_modifier: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMap {
    pub id: Uuid,
    /// Canonical flight key.
    pub flight_id: String,
    /// Previous key after a provider migration, still accepted on lookup.
    pub legacy_flight_id: Option<String>,
    pub aliases: Vec<String>,
    pub seats: Vec<Seat>,
    pub seats_meta: Vec<SeatMeta>,
    /// Optimistic-concurrency counter, bumped by every successful save.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SeatMap {
    pub fn new(flight_id: impl Into<String>, seats: Vec<Seat>) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_id: flight_id.into(),
            legacy_flight_id: None,
            aliases: Vec::new(),
            seats,
            seats_meta: Vec::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// True when `key` names this map directly, by legacy id, or by alias.
    pub fn matches_key(&self, key: &str) -> bool {
        self.flight_id == key
            || self.legacy_flight_id.as_deref() == Some(key)
            || self.aliases.iter().any(|a| a == key)
    }

    pub fn seat(&self, seat_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id == seat_id)
    }

    pub fn seat_mut(&mut self, seat_id: &str) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.id == seat_id)
    }

    pub fn meta_for(&self, seat_id: &str) -> Option<&SeatMeta> {
        self.seats_meta
            .iter()
            .find(|m| m.seat_id == seat_id || m.label.as_deref() == Some(seat_id))
    }

    /// Release every hold whose deadline has passed. Called on every
    /// mutation so expiry needs no background sweeper.
    pub fn expire_holds(&mut self, now: DateTime<Utc>) -> usize {
        let mut released = 0;
        for seat in &mut self.seats {
            if seat.state == SeatState::Held {
                let expired = seat
                    .hold
                    .as_ref()
                    .map(|h| h.expires_at <= now)
                    .unwrap_or(true);
                if expired {
                    seat.state = SeatState::Free;
                    seat.hold = None;
                    released += 1;
                }
            }
        }
        released
    }
}
