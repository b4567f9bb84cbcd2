//! Provider gateway registry
//!
//! Gateways are registered once per platform name and resolved once per
//! calendar. Adding a provider means registering an implementation here;
//! resolving an unregistered platform is a configuration error, never a
//! silent fallback.

use std::collections::HashMap;
use std::sync::Arc;

use dayline_domain::{DaylineError, Result};

use super::ports::CalendarGateway;

/// Registry of calendar gateways keyed by platform name.
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn CalendarGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway under a platform name. Names are matched
    /// case-insensitively; a later registration replaces an earlier one.
    pub fn register(&mut self, platform: impl Into<String>, gateway: Arc<dyn CalendarGateway>) {
        self.gateways.insert(platform.into().to_ascii_lowercase(), gateway);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, platform: impl Into<String>, gateway: Arc<dyn CalendarGateway>) -> Self {
        self.register(platform, gateway);
        self
    }

    /// Resolve the gateway for a platform name.
    pub fn resolve(&self, platform: &str) -> Result<Arc<dyn CalendarGateway>> {
        self.gateways
            .get(&platform.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DaylineError::UnsupportedPlatform(platform.to_string()))
    }

    /// Registered platform names (unordered).
    pub fn platforms(&self) -> Vec<&str> {
        self.gateways.keys().map(String::as_str).collect()
    }
}
