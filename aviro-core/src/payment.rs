use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::booking::SessionParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Processor's payment state for the session, e.g. "paid" / "unpaid".
    pub payment_status: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentInfo {
    pub id: String,
    pub status: String,
    pub charge_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundInfo {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub charge_id: Option<String>,
}

/// What to refund against, in order of preference as resolved by the
/// gateway: an explicit charge, else a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundTarget {
    Charge(String),
    PaymentIntent(String),
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a hosted checkout session. Callers pass the processor
    /// idempotency key inside `params`.
    async fn create_checkout_session(
        &self,
        params: &SessionParams,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>>;

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>>;

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntentInfo, Box<dyn std::error::Error + Send + Sync>>;

    async fn create_refund(
        &self,
        target: &RefundTarget,
        amount_minor: Option<i64>,
        reason: Option<&str>,
    ) -> Result<RefundInfo, Box<dyn std::error::Error + Send + Sync>>;

    async fn list_refunds(
        &self,
        target: &RefundTarget,
    ) -> Result<Vec<RefundInfo>, Box<dyn std::error::Error + Send + Sync>>;
}
