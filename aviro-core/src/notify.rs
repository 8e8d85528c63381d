use async_trait::async_trait;
use tracing::info;

use crate::model::booking::Booking;

/// Outbound customer notifications. All sends are best-effort from the
/// caller's point of view.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_payment_link(
        &self,
        booking: &Booking,
        url: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn send_booking_confirmation(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn send_cancellation_notice(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Logs instead of sending. Used in development and tests.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_payment_link(
        &self,
        booking: &Booking,
        url: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(booking_ref = %booking.booking_ref, %url, "payment link (not sent)");
        Ok(())
    }

    async fn send_booking_confirmation(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(booking_ref = %booking.booking_ref, "booking confirmation (not sent)");
        Ok(())
    }

    async fn send_cancellation_notice(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(booking_ref = %booking.booking_ref, "cancellation notice (not sent)");
        Ok(())
    }
}
