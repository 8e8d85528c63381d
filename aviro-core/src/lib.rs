pub mod model;
pub mod notify;
pub mod payment;
pub mod provider;
pub mod repository;

pub use model::addon::Addon;
pub use model::booking::{
    AppliedCoupon, Booking, BookingAddon, BookingDiscount, BookingPrice, BookingSeat,
    BookingStatus, Passenger, PaymentInfo, RefundRecord, SessionParams, Ticketing,
    TicketingStatus,
};
pub use model::coupon::Coupon;
pub use model::flight::{Flight, FlightOffer, FlightSearchQuery};
pub use model::reconcile::{ReconcileEntry, ReconcileOutcome, ReconciliationRun};
pub use model::seatmap::{Seat, SeatHold, SeatMap, SeatMeta, SeatState};
pub use model::{minor_unit_multiplier, Money};
