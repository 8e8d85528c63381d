use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::minor_unit_multiplier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    PendingPayment,
    Paid,
    Ticketed,
    TicketingFailed,
    Cancelled,
    CancelledPendingRefund,
    Refunded,
    PartiallyRefunded,
    PaymentExpired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::Paid => "PAID",
            BookingStatus::Ticketed => "TICKETED",
            BookingStatus::TicketingFailed => "TICKETING_FAILED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::CancelledPendingRefund => "CANCELLED_PENDING_REFUND",
            BookingStatus::Refunded => "REFUNDED",
            BookingStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            BookingStatus::PaymentExpired => "PAYMENT_EXPIRED",
        }
    }

    /// Money has been captured for this booking at some point.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            BookingStatus::Paid
                | BookingStatus::Ticketed
                | BookingStatus::TicketingFailed
        )
    }

    /// Terminal states where cancellation is either done or moot. An
    /// expired booking counts: its seats are already back on the map.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled
                | BookingStatus::CancelledPendingRefund
                | BookingStatus::Refunded
                | BookingStatus::PartiallyRefunded
                | BookingStatus::PaymentExpired
        )
    }
}

/// Server-computed price, frozen at booking creation. All amounts are
/// major units in `currency`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingPrice {
    pub seats_total: i64,
    pub addons_total: i64,
    pub discount_total: i64,
    pub taxable: i64,
    pub tax: i64,
    /// Grand total, the single source of truth for every payment amount.
    pub amount: i64,
    pub currency: String,
}

impl BookingPrice {
    pub fn amount_minor(&self) -> i64 {
        self.amount * minor_unit_multiplier(&self.currency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSeat {
    pub seat_id: String,
    pub label: Option<String>,
    pub cabin: Option<String>,
    pub price: i64,
    /// Which fallback produced the price (map, hint, base-fare split, cabin).
    pub price_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAddon {
    pub code: String,
    pub name: String,
    /// Per-unit amount; the line contributes `amount * qty`.
    pub amount: i64,
    #[serde(default = "default_qty")]
    pub qty: i64,
}

fn default_qty() -> i64 {
    1
}

impl BookingAddon {
    pub fn line_total(&self) -> i64 {
        self.amount * self.qty
    }
}

/// A free-form price reduction granted outside the coupon machinery,
/// for example a service-recovery credit keyed in by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDiscount {
    #[serde(default)]
    pub name: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<chrono::NaiveDate>,
}

/// A coupon as applied to one booking, with the validation verdict kept
/// alongside so audits can see what the server concluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: i64,
    pub validated: bool,
    pub reason: Option<String>,
}

/// The exact checkout-session parameters sent to the processor, persisted
/// so reconciliation can recreate an identical session later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionParams {
    pub booking_id: Uuid,
    pub booking_ref: String,
    pub amount_minor: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    /// Processor-side status string, informational only.
    pub processor_status: Option<String>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Webhook deliveries seen for this booking, duplicates included.
    pub webhook_deliveries: u32,
    pub session_params: Option<SessionParams>,
    pub last_payment_link: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketingStatus {
    Pending,
    Issued,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticketing {
    pub status: TicketingStatus,
    pub attempts: u32,
    pub pnr: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Ticketing {
    pub fn pending() -> Self {
        Self {
            status: TicketingStatus::Pending,
            attempts: 0,
            pnr: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub booking_ref: String,
    pub user_id: String,
    pub contact_email: Option<String>,
    pub flight_id: String,
    pub airline: Option<String>,
    #[serde(default)]
    pub passengers: Vec<Passenger>,
    pub seats: Vec<BookingSeat>,
    pub addons: Vec<BookingAddon>,
    #[serde(default)]
    pub discounts: Vec<BookingDiscount>,
    pub coupons: Vec<AppliedCoupon>,
    pub price: BookingPrice,
    pub status: BookingStatus,
    pub payment: PaymentInfo,
    pub ticketing: Option<Ticketing>,
    pub refunds: Vec<RefundRecord>,
    pub cancellation_fee: Option<i64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub provider: Option<String>,
    pub provider_booking_id: Option<String>,
    pub provider_pnr: Option<String>,
    pub raw_provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn update_status(&mut self, status: BookingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Sum of all recorded refunds, in minor units.
    pub fn refunded_minor_total(&self) -> i64 {
        self.refunds.iter().map(|r| r.amount_minor).sum()
    }
}
