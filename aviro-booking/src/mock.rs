use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;

use aviro_core::model::booking::Booking;
use aviro_core::model::flight::{FlightOffer, FlightSearchQuery};
use aviro_core::provider::{AirlineProvider, ProviderBooking, TicketIssue};

/// Provider double for tests and offline development. Failure toggles
/// cover the outage paths; ticket calls are counted so retry accounting
/// can be asserted.
pub struct MockAirlineProvider {
    offers: Mutex<Vec<FlightOffer>>,
    fail_search: AtomicBool,
    fail_booking: AtomicBool,
    fail_ticketing: AtomicBool,
    ticket_calls: AtomicU32,
}

impl MockAirlineProvider {
    pub fn new() -> Self {
        Self {
            offers: Mutex::new(Vec::new()),
            fail_search: AtomicBool::new(false),
            fail_booking: AtomicBool::new(false),
            fail_ticketing: AtomicBool::new(false),
            ticket_calls: AtomicU32::new(0),
        }
    }

    pub fn set_offers(&self, offers: Vec<FlightOffer>) {
        *self.offers.lock().unwrap() = offers;
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_booking(&self, fail: bool) {
        self.fail_booking.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ticketing(&self, fail: bool) {
        self.fail_ticketing.store(fail, Ordering::SeqCst);
    }

    pub fn ticket_calls(&self) -> u32 {
        self.ticket_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAirlineProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AirlineProvider for MockAirlineProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        _query: &FlightSearchQuery,
    ) -> Result<Vec<FlightOffer>, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err("provider search unavailable".into());
        }
        Ok(self.offers.lock().unwrap().clone())
    }

    async fn revalidate(
        &self,
        offer_id: &str,
    ) -> Result<FlightOffer, Box<dyn std::error::Error + Send + Sync>> {
        self.offers
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.offer_id == offer_id)
            .cloned()
            .ok_or_else(|| format!("offer {offer_id} no longer available").into())
    }

    async fn book_flight(
        &self,
        booking: &Booking,
    ) -> Result<ProviderBooking, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_booking.load(Ordering::SeqCst) {
            return Err("provider booking unavailable".into());
        }
        let suffix: [u8; 4] = rand::thread_rng().gen();
        let provider_id = format!(
            "MOCK-{:02X}{:02X}{:02X}{:02X}",
            suffix[0], suffix[1], suffix[2], suffix[3]
        );
        Ok(ProviderBooking {
            booking_id: provider_id.clone(),
            pnr: None,
            raw: json!({
                "provider": "mock",
                "id": provider_id,
                "booking_ref": booking.booking_ref,
            }),
        })
    }

    async fn issue_ticket(
        &self,
        booking: &Booking,
    ) -> Result<TicketIssue, Box<dyn std::error::Error + Send + Sync>> {
        self.ticket_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ticketing.load(Ordering::SeqCst) {
            return Err("ticketing system unavailable".into());
        }
        let suffix: [u8; 3] = rand::thread_rng().gen();
        let pnr = format!("{:02X}{:02X}{:02X}", suffix[0], suffix[1], suffix[2]);
        Ok(TicketIssue {
            raw: json!({ "pnr": pnr, "booking_ref": booking.booking_ref }),
            pnr,
        })
    }
}
