use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::model::booking::Booking;
use crate::model::flight::{FlightOffer, FlightSearchQuery};

/// A cached provider OAuth token with its absolute expiry. Held by the
/// provider client itself rather than any shared global state.
#[derive(Debug, Clone)]
pub struct TokenCache {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenCache {
    /// Valid with a safety margin, so a token about to lapse mid-request
    /// counts as expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(30) < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct ProviderBooking {
    pub booking_id: String,
    pub pnr: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct TicketIssue {
    pub pnr: String,
    pub raw: Value,
}

/// External GDS / airline API client.
#[async_trait]
pub trait AirlineProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &FlightSearchQuery,
    ) -> Result<Vec<FlightOffer>, Box<dyn std::error::Error + Send + Sync>>;

    /// Re-price a previously returned offer.
    async fn revalidate(
        &self,
        offer_id: &str,
    ) -> Result<FlightOffer, Box<dyn std::error::Error + Send + Sync>>;

    async fn book_flight(
        &self,
        booking: &Booking,
    ) -> Result<ProviderBooking, Box<dyn std::error::Error + Send + Sync>>;

    async fn issue_ticket(
        &self,
        booking: &Booking,
    ) -> Result<TicketIssue, Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expiring_within_margin_is_invalid() {
        let now = Utc::now();
        let cache = TokenCache {
            token: "t".into(),
            expires_at: now + Duration::seconds(10),
        };
        assert!(!cache.is_valid(now));

        let cache = TokenCache {
            token: "t".into(),
            expires_at: now + Duration::minutes(10),
        };
        assert!(cache.is_valid(now));
    }
}
