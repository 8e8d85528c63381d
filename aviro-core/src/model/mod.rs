use serde::{Deserialize, Serialize};

pub mod addon;
pub mod booking;
pub mod coupon;
pub mod flight;
pub mod reconcile;
pub mod seatmap;

/// An amount of money in major currency units (whole dollars, euros, yen).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Convert to the smallest unit the payment processor works in.
    pub fn minor_units(&self) -> i64 {
        self.amount * minor_unit_multiplier(&self.currency)
    }
}

/// Major-to-minor unit multiplier. Zero-decimal currencies have no
/// subdivision, everything else is treated as cents.
pub fn minor_unit_multiplier(currency: &str) -> i64 {
    match currency.to_ascii_lowercase().as_str() {
        "jpy" => 1,
        _ => 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_for_decimal_currency() {
        assert_eq!(Money::new(2394, "usd").minor_units(), 239_400);
    }

    #[test]
    fn minor_units_for_zero_decimal_currency() {
        assert_eq!(Money::new(2394, "JPY").minor_units(), 2394);
    }
}
