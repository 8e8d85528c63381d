pub mod lifecycle;
pub mod mock;
pub mod reconcile;

pub use lifecycle::{
    BookingError, BookingLifecycle, CancelOptions, CreateBookingRequest, LifecycleConfig,
};
pub use mock::MockAirlineProvider;
pub use reconcile::{ReconcileError, ReconcileOptions, ReconciliationEngine};
