//! # Dayline Core
//!
//! Pure business logic for calendar synchronization - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for repositories, gateway, credentials
//!   and the Unit-of-Work
//! - The recurrence classifier, event mapper and reconciler
//! - Webhook subscription lifecycle management
//! - The sync orchestration commands
//!
//! ## Architecture Principles
//! - Only depends on `dayline-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::batch::{DomainEvent, MutationBatch, ReconcileSummary};
pub use sync::mapper::{MapEventError, MappedEvent, UNTITLED_PLACEHOLDER};
pub use sync::ports::{
    AuthTokenRepository, CalendarGateway, CalendarRepository, Credential, CredentialStore,
    EntryRepository, EventPage, FetchWindow, ProviderCalendar, ProviderEvent, UnitOfWork,
};
pub use sync::recurrence::FrequencyCache;
pub use sync::reconciler::Reconciler;
pub use sync::registry::GatewayRegistry;
pub use sync::service::{CalendarSyncReport, CalendarSyncService};
pub use sync::subscription::SubscriptionManager;
