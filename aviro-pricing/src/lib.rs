pub mod coupon;
pub mod engine;

pub use coupon::{CouponInput, CouponReason, InlineCoupon, ResolvedCoupon};
pub use engine::{
    round_div, AddonSelection, DiscountInput, PricingEngine, PricingError, PricingPolicy, Quote,
    QuoteRequest, ResolvedAddon, SeatSelection,
};
