//! Provider payload to local entry/series mapping
//!
//! One provider event becomes one [`CalendarEntry`] plus, for occurrences of
//! a recurring series, a candidate [`CalendarEntrySeries`]. Mapping is
//! deliberately forgiving: malformed timestamps and blank titles are
//! normalized with a data-quality warning, never surfaced as errors. The one
//! hard failure - an event without a usable id - is typed so the caller can
//! skip it and keep the pass alive.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use dayline_domain::{
    Calendar, CalendarEntry, CalendarEntrySeries, EntryStatus, SyncConfig,
};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::ports::{CalendarGateway, Credential, ProviderEvent};
use super::recurrence::{self, FrequencyCache};

/// Placeholder name so downstream UI/text never renders an empty string.
pub const UNTITLED_PLACEHOLDER: &str = "(no title)";

const MIN_PLAUSIBLE_YEAR: i32 = 1970;
const MAX_PLAUSIBLE_YEAR: i32 = 3000;

/// Per-event mapping failure, recovered by the caller (skip and log).
#[derive(Debug, Error)]
pub enum MapEventError {
    #[error("provider event has no usable id")]
    MissingEventId,
}

/// Result of mapping one provider event.
#[derive(Debug, Clone)]
pub struct MappedEvent {
    pub entry: CalendarEntry,
    /// Candidate series; the reconciler rebinds it to an existing local
    /// series when one is already stored for the same platform id.
    pub series: Option<CalendarEntrySeries>,
}

/// Map one provider event into local value objects.
///
/// `now` is the pass's reference time; it anchors the timestamp fallback so
/// a whole pass maps against one consistent clock.
pub async fn map_event(
    calendar: &Calendar,
    event: &ProviderEvent,
    gateway: &dyn CalendarGateway,
    credential: &Credential,
    cache: &mut FrequencyCache,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> Result<MappedEvent, MapEventError> {
    if event.id.trim().is_empty() {
        return Err(MapEventError::MissingEventId);
    }

    let series_platform_id = derive_series_platform_id(event);
    let frequency = recurrence::resolve_series_frequency(
        event,
        series_platform_id.as_deref(),
        calendar,
        gateway,
        credential,
        cache,
    )
    .await;

    let name = normalize_title(event.summary.as_deref());
    let status =
        event.status.as_deref().map(EntryStatus::from).unwrap_or(EntryStatus::Confirmed);
    let start = parse_event_time(&event.start, "start", &event.id, config.user_timezone, now);
    let end = parse_event_time(&event.end, "end", &event.id, config.user_timezone, now);

    let series = series_platform_id.map(|platform_id| CalendarEntrySeries {
        id: Uuid::now_v7().to_string(),
        calendar_id: calendar.id.clone(),
        platform_id,
        name: name.clone(),
        frequency,
    });

    let entry = CalendarEntry {
        id: Uuid::now_v7().to_string(),
        calendar_id: calendar.id.clone(),
        series_id: series.as_ref().map(|series| series.id.clone()),
        platform_id: event.id.clone(),
        name,
        status,
        start,
        end,
        frequency,
    };

    Ok(MappedEvent { entry, series })
}

/// Derive the platform id of the series this event belongs to, if any.
///
/// The recurring-series identifier wins, stripped of any instance-specific
/// suffix. Without one, a stable cross-instance identifier (iCal UID) paired
/// with an original-start-time marker identifies the series. Neither marker
/// means the event stands alone.
pub fn derive_series_platform_id(event: &ProviderEvent) -> Option<String> {
    if let Some(master_id) = event.series_master_id.as_deref() {
        let stripped = strip_instance_suffix(master_id);
        if !stripped.is_empty() {
            return Some(stripped.to_string());
        }
    }

    if event.original_start_time.is_some() {
        if let Some(uid) = event.ical_uid.as_deref() {
            if !uid.is_empty() {
                return Some(uid.to_string());
            }
        }
    }

    None
}

/// Instance ids embed the series id ahead of a `_`-separated occurrence
/// suffix (`series123_20260204T081500Z`).
fn strip_instance_suffix(id: &str) -> &str {
    id.split('_').next().unwrap_or(id)
}

fn normalize_title(summary: Option<&str>) -> String {
    match summary.map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => UNTITLED_PLACEHOLDER.to_string(),
    }
}

/// Parse a provider timestamp value, falling back to `now` on anything
/// malformed. The fallback is a data-quality warning, never an error.
fn parse_event_time(
    value: &Value,
    field: &'static str,
    event_id: &str,
    timezone: Tz,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match try_parse_event_time(value, timezone) {
        Some(parsed) if plausible_year(parsed) => parsed,
        Some(parsed) => {
            warn!(
                event_id,
                field,
                year = parsed.year(),
                "timestamp year is implausible; falling back to pass reference time"
            );
            now
        }
        None => {
            warn!(
                event_id,
                field,
                raw = %value,
                "unparseable timestamp; falling back to pass reference time"
            );
            now
        }
    }
}

fn try_parse_event_time(value: &Value, timezone: Tz) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    // Date-only values mark all-day events: local midnight in the user's
    // timezone.
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return timezone
            .from_local_datetime(&midnight)
            .earliest()
            .map(|local| local.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Naive timestamps are assumed UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn plausible_year(timestamp: DateTime<Utc>) -> bool {
    (MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(&timestamp.year())
}
