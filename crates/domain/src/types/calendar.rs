//! Calendar synchronization model types
//!
//! Entities mirror what the persistence layer stores; the sync engine only
//! ever hands them across the Unit-of-Work boundary, it never writes rows
//! itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Internal recurrence classification derived from provider recurrence rules.
///
/// Serialized names are the wire/storage literals (`ONCE`, `BI_WEEKLY`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    BiWeekly,
    WeekDays,
    WeekendDays,
    CustomWeekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn is_recurring(self) -> bool {
        !matches!(self, Self::Once)
    }
}

/// Provider-reported entry status, copied verbatim.
///
/// Unknown values are preserved in `Other` rather than coerced; the engine
/// only ever branches on `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryStatus {
    Confirmed,
    Tentative,
    Cancelled,
    Other(String),
}

impl EntryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<&str> for EntryStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "confirmed" => Self::Confirmed,
            "tentative" => Self::Tentative,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EntryStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<EntryStatus> for String {
    fn from(status: EntryStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A user's linked calendar on an external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub auth_token_id: String,
    /// Provider name, e.g. `"google"`. Resolves a gateway via the registry.
    pub provider: String,
    /// Provider-side calendar id; unique per (user, provider).
    pub platform_id: String,
    /// Presence is the sole source of truth for "receiving push
    /// notifications".
    pub sync_subscription: Option<SyncSubscription>,
}

impl Calendar {
    pub fn is_subscribed(&self) -> bool {
        self.sync_subscription.is_some()
    }
}

/// OAuth credentials for one provider account.
///
/// Created by the OAuth linking flow and mutated only by the
/// credential-refresh flow; the sync engine never creates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// True when the access token expires within `threshold` of `now`.
    pub fn expires_within(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + threshold
    }
}

/// A leased webhook channel registered with the provider.
///
/// Value object embedded in [`Calendar`]; replaced wholesale on renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSubscription {
    pub subscription_id: String,
    pub resource_id: String,
    pub expiration: DateTime<Utc>,
    pub provider: String,
    /// Opaque value echoed back in webhook notifications.
    pub client_state: String,
    /// Provider-issued incremental-fetch cursor, when one has been observed.
    pub sync_token: Option<String>,
    pub webhook_url: String,
}

impl SyncSubscription {
    /// True when the channel lease expires within `threshold` of `now`.
    pub fn expires_within(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.expiration <= now + threshold
    }
}

/// A recurring event group; created lazily the first time one of its
/// occurrences is observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntrySeries {
    pub id: String,
    pub calendar_id: String,
    /// Provider-side series id; `(calendar_id, platform_id)` is the
    /// idempotency key.
    pub platform_id: String,
    pub name: String,
    pub frequency: Frequency,
}

impl CalendarEntrySeries {
    /// Field-wise comparison ignoring the local id; drives "update only if
    /// changed" during reconciliation.
    pub fn observably_equal(&self, other: &Self) -> bool {
        self.calendar_id == other.calendar_id
            && self.platform_id == other.platform_id
            && self.name == other.name
            && self.frequency == other.frequency
    }
}

/// One concrete occurrence, recurring or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    pub calendar_id: String,
    /// Local series id when this occurrence belongs to a recurring group.
    pub series_id: Option<String>,
    /// Provider-side occurrence id; `(calendar_id, platform_id)` is the
    /// idempotency key.
    pub platform_id: String,
    pub name: String,
    pub status: EntryStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Denormalized from the owning series; `Once` for one-off entries.
    pub frequency: Frequency,
}

impl CalendarEntry {
    /// Field-wise comparison ignoring the local id; drives "update only if
    /// changed" during reconciliation.
    pub fn observably_equal(&self, other: &Self) -> bool {
        self.calendar_id == other.calendar_id
            && self.platform_id == other.platform_id
            && self.series_id == other.series_id
            && self.name == other.name
            && self.status == other.status
            && self.start == other.start
            && self.end == other.end
            && self.frequency == other.frequency
    }
}
