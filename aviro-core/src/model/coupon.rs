use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A server-side coupon definition. `percent` and `amount` are mutually
/// optional; percent discounts may be capped by `cap_amount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub active: bool,
    pub percent: Option<i64>,
    pub amount: Option<i64>,
    pub cap_amount: Option<i64>,
    pub currency: Option<String>,
    pub min_fare: Option<i64>,
    pub airline: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub per_user_limit: Option<i64>,
}

impl Coupon {
    pub fn percent_off(code: impl Into<String>, percent: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            description: None,
            active: true,
            percent: Some(percent),
            amount: None,
            cap_amount: None,
            currency: None,
            min_fare: None,
            airline: None,
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            used_count: 0,
            per_user_limit: None,
        }
    }
}
