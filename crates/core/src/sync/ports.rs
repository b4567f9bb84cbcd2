//! Port interfaces for the calendar sync engine
//!
//! These traits define the boundaries between the sync engine and
//! infrastructure implementations: read-only repositories, the provider
//! gateway, the credential store and the Unit-of-Work write path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dayline_domain::{AuthToken, Calendar, CalendarEntry, CalendarEntrySeries, Result, SyncSubscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::batch::MutationBatch;

/// Raw provider event payload, normalized to provider-agnostic field names
/// by the gateway. Timestamps are kept as raw JSON values: providers have
/// been observed sending nulls and bare objects where strings belong, and
/// the mapper owns the fallback behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    pub summary: Option<String>,
    pub status: Option<String>,
    /// RFC-3339 string when well-formed; date-only strings mark all-day
    /// events.
    pub start: Value,
    pub end: Value,
    /// RFC-5545 style recurrence rule lines (`RRULE:...`).
    pub recurrence: Vec<String>,
    /// Provider id of the recurring series this occurrence belongs to.
    pub series_master_id: Option<String>,
    /// Stable cross-instance identifier (iCal UID equivalent).
    pub ical_uid: Option<String>,
    /// Present on occurrences that were moved from their scheduled slot.
    pub original_start_time: Option<String>,
}

/// One provider calendar as listed by the provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCalendar {
    pub id: String,
    pub name: String,
    pub primary: bool,
}

/// Result of a window-bounded event fetch. Pagination is followed inside the
/// gateway; callers always see the full window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<ProviderEvent>,
    /// Incremental-fetch cursor issued by the provider, when available.
    pub sync_token: Option<String>,
}

/// A refreshed-or-valid access credential, obtained once per pass.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Time bounds for a provider event fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

/// Provider boundary: list/get/watch/stop operations against one calendar
/// platform. Implementations isolate provider-specific payload shapes.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// List the calendars visible to the credential's account.
    async fn list_calendars(&self, credential: &Credential) -> Result<Vec<ProviderCalendar>>;

    /// List events within the window, recurring instances expanded,
    /// soft-deleted events excluded.
    async fn list_events(
        &self,
        calendar: &Calendar,
        credential: &Credential,
        window: FetchWindow,
    ) -> Result<EventPage>;

    /// Fetch one series (parent) event by its provider id.
    async fn get_series(
        &self,
        calendar: &Calendar,
        credential: &Credential,
        series_id: &str,
    ) -> Result<ProviderEvent>;

    /// Create a webhook channel for the calendar.
    async fn watch(
        &self,
        calendar: &Calendar,
        credential: &Credential,
        webhook_url: &str,
        client_state: &str,
    ) -> Result<SyncSubscription>;

    /// Stop a webhook channel.
    async fn stop(&self, credential: &Credential, subscription: &SyncSubscription) -> Result<()>;
}

/// Supplies a refreshed, valid credential for an auth-token record.
///
/// Called once per sync pass to bound provider load. An unrefreshable token
/// fails with [`dayline_domain::DaylineError::TokenExpired`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn ensure_valid(&self, token: &AuthToken) -> Result<Credential>;
}

/// Read-only calendar lookups.
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    async fn find_calendar(&self, calendar_id: &str) -> Result<Calendar>;

    async fn list_calendars_for_user(&self, user_id: &str) -> Result<Vec<Calendar>>;

    /// Calendars that currently hold an active subscription.
    async fn list_subscribed_calendars(&self) -> Result<Vec<Calendar>>;
}

/// Read-only auth token lookups.
#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    async fn find_auth_token(&self, token_id: &str) -> Result<AuthToken>;
}

/// Read-only entry/series lookups used to diff a pass against local state.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    async fn list_entries(&self, calendar_id: &str) -> Result<Vec<CalendarEntry>>;

    async fn list_series(&self, calendar_id: &str) -> Result<Vec<CalendarEntrySeries>>;
}

/// The only write path to local entries/series.
///
/// Implementations persist the staged mutations atomically - all or none -
/// and emit the batch's domain events for downstream audit/notification
/// consumers.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn commit(&self, batch: MutationBatch) -> Result<()>;
}
