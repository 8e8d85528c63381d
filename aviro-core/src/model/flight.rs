use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;

/// A flight as stored locally. Locally-managed rows carry provider
/// `"manual"`; rows mirrored from a GDS carry the provider's tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub provider: String,
    pub airline: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub price: Money,
    pub seats_available: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlightSearchQuery {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    #[serde(default = "default_adults")]
    pub adults: u32,
}

fn default_adults() -> u32 {
    1
}

/// A priced itinerary returned to callers, whichever source produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightOffer {
    pub provider: String,
    pub offer_id: String,
    pub airline: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl FlightOffer {
    pub fn from_flight(flight: &Flight) -> Self {
        Self {
            provider: flight.provider.clone(),
            offer_id: flight.id.to_string(),
            airline: flight.airline.clone(),
            flight_number: flight.flight_number.clone(),
            origin: flight.origin.clone(),
            destination: flight.destination.clone(),
            departure_at: flight.departure_at,
            arrival_at: flight.arrival_at,
            price: flight.price.clone(),
            raw: None,
        }
    }
}
