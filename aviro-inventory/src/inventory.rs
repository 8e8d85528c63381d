use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use aviro_core::model::booking::Booking;
use aviro_core::model::seatmap::{SeatHold, SeatMap, SeatState};
use aviro_core::repository::{SaveError, SeatMapStore};

#[derive(Debug, Error)]
pub enum SeatError {
    #[error("no seat map for flight {0}")]
    MapNotFound(String),
    #[error("unknown seat {0}")]
    InvalidSeat(String),
    #[error("seat {0} is not available")]
    SeatUnavailable(String),
    #[error("seat map kept changing concurrently, giving up")]
    Conflict,
    #[error("storage error: {0}")]
    Store(String),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for SeatError {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        SeatError::Store(e.to_string())
    }
}

/// Result of putting a cancelled booking's seats back on the map. Never an
/// error: cancellation must not fail because the map drifted.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub ok: bool,
    pub restored: usize,
    pub not_found: Vec<String>,
}

/// Seat occupancy service. Every mutation re-reads the map, releases
/// expired holds, validates the transition, and saves with a version
/// check. A failed check means someone else won; we reload and try again
/// a bounded number of times.
pub struct SeatInventory {
    store: Arc<dyn SeatMapStore>,
    max_retries: u32,
}

impl SeatInventory {
    pub fn new(store: Arc<dyn SeatMapStore>) -> Self {
        Self {
            store,
            max_retries: 3,
        }
    }

    pub async fn get(&self, flight_key: &str) -> Result<SeatMap, SeatError> {
        let mut map = self
            .store
            .find_by_key(flight_key)
            .await?
            .ok_or_else(|| SeatError::MapNotFound(flight_key.to_string()))?;
        // Reads also reflect expiry, but without a competing save there is
        // nothing to persist.
        map.expire_holds(Utc::now());
        Ok(map)
    }

    /// Place a time-boxed hold on each seat for `holder`. Re-holding a seat
    /// you already hold refreshes the deadline.
    pub async fn hold(
        &self,
        flight_key: &str,
        seat_ids: &[String],
        holder: &str,
        hold_minutes: i64,
    ) -> Result<SeatMap, SeatError> {
        self.mutate(flight_key, |map| {
            let expires_at = Utc::now() + Duration::minutes(hold_minutes);
            for seat_id in seat_ids {
                let seat = map
                    .seat_mut(seat_id)
                    .ok_or_else(|| SeatError::InvalidSeat(seat_id.clone()))?;
                match seat.state {
                    SeatState::Booked => return Err(SeatError::SeatUnavailable(seat_id.clone())),
                    SeatState::Held => {
                        let mine = seat
                            .hold
                            .as_ref()
                            .map(|h| h.holder == holder)
                            .unwrap_or(false);
                        if !mine {
                            return Err(SeatError::SeatUnavailable(seat_id.clone()));
                        }
                    }
                    SeatState::Free => {}
                }
                seat.state = SeatState::Held;
                seat.hold = Some(SeatHold {
                    holder: holder.to_string(),
                    expires_at,
                });
            }
            Ok(())
        })
        .await
    }

    /// Promote seats to BOOKED. Accepts seats that are free or held by
    /// `holder`; anything else is a conflict with another customer.
    pub async fn confirm(
        &self,
        flight_key: &str,
        seat_ids: &[String],
        holder: &str,
    ) -> Result<SeatMap, SeatError> {
        self.mutate(flight_key, |map| {
            for seat_id in seat_ids {
                let seat = map
                    .seat_mut(seat_id)
                    .ok_or_else(|| SeatError::InvalidSeat(seat_id.clone()))?;
                match seat.state {
                    SeatState::Booked => return Err(SeatError::SeatUnavailable(seat_id.clone())),
                    SeatState::Held => {
                        let mine = seat
                            .hold
                            .as_ref()
                            .map(|h| h.holder == holder)
                            .unwrap_or(false);
                        if !mine {
                            return Err(SeatError::SeatUnavailable(seat_id.clone()));
                        }
                    }
                    SeatState::Free => {}
                }
                seat.state = SeatState::Booked;
                seat.hold = None;
            }
            Ok(())
        })
        .await
    }

    /// Drop `holder`'s holds. Seats already free, booked, or held by
    /// someone else are left alone, so repeated releases are harmless.
    pub async fn release(
        &self,
        flight_key: &str,
        seat_ids: &[String],
        holder: &str,
    ) -> Result<SeatMap, SeatError> {
        self.mutate(flight_key, |map| {
            for seat_id in seat_ids {
                if let Some(seat) = map.seat_mut(seat_id) {
                    let mine = seat.state == SeatState::Held
                        && seat
                            .hold
                            .as_ref()
                            .map(|h| h.holder == holder)
                            .unwrap_or(false);
                    if mine {
                        seat.state = SeatState::Free;
                        seat.hold = None;
                    }
                }
            }
            Ok(())
        })
        .await
    }

    /// Put a cancelled booking's seats back on sale. The booking may
    /// reference the map by a stale key and seats by label, so matching is
    /// forgiving and misses are reported, not fatal.
    pub async fn restore(&self, booking: &Booking) -> RestoreReport {
        let seat_keys: Vec<String> = booking.seats.iter().map(|s| s.seat_id.clone()).collect();
        let result = self
            .mutate(&booking.flight_id, |map| {
                for booked in &booking.seats {
                    let canonical = Self::resolve_seat_id(map, booked);
                    if let Some(seat_id) = canonical {
                        if let Some(seat) = map.seat_mut(&seat_id) {
                            if seat.state == SeatState::Booked {
                                seat.state = SeatState::Free;
                                seat.hold = None;
                            }
                        }
                    }
                }
                Ok(())
            })
            .await;

        match result {
            Ok(map) => {
                let not_found: Vec<String> = booking
                    .seats
                    .iter()
                    .filter(|s| Self::resolve_seat_id(&map, s).is_none())
                    .map(|s| s.seat_id.clone())
                    .collect();
                RestoreReport {
                    ok: true,
                    restored: seat_keys.len() - not_found.len(),
                    not_found,
                }
            }
            Err(SeatError::MapNotFound(key)) => {
                warn!(%key, "seat restore skipped, map not found");
                RestoreReport {
                    ok: false,
                    restored: 0,
                    not_found: seat_keys,
                }
            }
            Err(e) => {
                warn!(error = %e, booking = %booking.booking_ref, "seat restore failed");
                RestoreReport {
                    ok: false,
                    restored: 0,
                    not_found: seat_keys,
                }
            }
        }
    }

    fn resolve_seat_id(
        map: &SeatMap,
        booked: &aviro_core::model::booking::BookingSeat,
    ) -> Option<String> {
        if map.seat(&booked.seat_id).is_some() {
            return Some(booked.seat_id.clone());
        }
        if let Some(label) = &booked.label {
            if map.seat(label).is_some() {
                return Some(label.clone());
            }
        }
        // The metadata table may map a display label back to a seat id.
        map.meta_for(&booked.seat_id)
            .or_else(|| booked.label.as_deref().and_then(|l| map.meta_for(l)))
            .filter(|m| map.seat(&m.seat_id).is_some())
            .map(|m| m.seat_id.clone())
    }

    async fn mutate<F>(&self, flight_key: &str, apply: F) -> Result<SeatMap, SeatError>
    where
        F: Fn(&mut SeatMap) -> Result<(), SeatError>,
    {
        let mut attempt = 0;
        loop {
            let mut map = self
                .store
                .find_by_key(flight_key)
                .await?
                .ok_or_else(|| SeatError::MapNotFound(flight_key.to_string()))?;
            let loaded_version = map.version;

            let expired = map.expire_holds(Utc::now());
            if expired > 0 {
                debug!(flight = flight_key, expired, "released expired holds");
            }

            apply(&mut map)?;
            map.updated_at = Utc::now();

            match self.store.save(&map, loaded_version).await {
                Ok(()) => {
                    map.version = loaded_version + 1;
                    return Ok(map);
                }
                Err(SaveError::Conflict) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(SeatError::Conflict);
                    }
                    debug!(flight = flight_key, attempt, "seat map save conflict, retrying");
                }
                Err(SaveError::Other(e)) => return Err(SeatError::Store(e)),
            }
        }
    }
}
