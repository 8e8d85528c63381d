pub mod gateway;
pub mod mock;
pub mod webhook;

pub use gateway::{
    GatewayConfig, PaymentError, PaymentGateway, RefundRequest, WebhookOutcome,
};
pub use mock::MockProcessor;
