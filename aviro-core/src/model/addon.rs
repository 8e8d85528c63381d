use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ancillary product (baggage, meal, lounge). The canonical price list;
/// client-supplied add-on amounts are never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Addon {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub amount: i64,
    pub currency: String,
    pub category: Option<String>,
    /// When set, the add-on is only sellable on this airline.
    pub airline: Option<String>,
    pub active: bool,
}

impl Addon {
    pub fn new(code: impl Into<String>, name: impl Into<String>, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            amount,
            currency: "usd".to_string(),
            category: None,
            airline: None,
            active: true,
        }
    }
}
