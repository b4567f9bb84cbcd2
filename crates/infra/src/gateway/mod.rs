//! Provider gateway adapters

pub mod google;
pub mod retry;

use std::sync::Arc;

use dayline_core::GatewayRegistry;

pub use google::GoogleCalendarGateway;
pub use retry::RetryPolicy;

/// Registry with every built-in provider gateway registered.
pub fn standard_registry() -> GatewayRegistry {
    GatewayRegistry::new().with("google", Arc::new(GoogleCalendarGateway::new()))
}
