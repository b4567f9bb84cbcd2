//! # Dayline Infra
//!
//! Infrastructure adapters for the sync engine:
//! - Provider gateways (Google Calendar over reqwest) behind the core
//!   `CalendarGateway` port
//! - OAuth credential store implementing `CredentialStore`
//! - Retry/backoff policy applied at the gateway boundary
//! - Cron-based sync scheduler with explicit lifecycle management
//!
//! Persistence (the Unit-of-Work implementation) lives with the application
//! host, not here; this crate only talks to the outside world.

pub mod credentials;
pub mod gateway;
pub mod scheduling;

pub use credentials::OAuthCredentialStore;
pub use gateway::{standard_registry, GoogleCalendarGateway, RetryPolicy};
pub use scheduling::{SyncScheduler, SyncSchedulerConfig};
