use std::sync::Arc;

use aviro_booking::{BookingLifecycle, ReconciliationEngine};
use aviro_core::provider::AirlineProvider;
use aviro_core::repository::FlightRepository;
use aviro_inventory::SeatInventory;
use aviro_payments::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<BookingLifecycle>,
    pub gateway: Arc<PaymentGateway>,
    pub inventory: Arc<SeatInventory>,
    pub reconciler: Arc<ReconciliationEngine>,
    pub flights: Arc<dyn FlightRepository>,
    pub provider: Arc<dyn AirlineProvider>,
    pub hold_minutes: i64,
}
