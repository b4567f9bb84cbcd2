//! Recurrence rule classification
//!
//! Maps RFC-5545 style `RRULE:` lines onto the internal [`Frequency`] model.
//! Classification is pure and total: any input that cannot be understood
//! classifies as `Once`.

use std::collections::{BTreeSet, HashMap};

use dayline_domain::{Calendar, Frequency};
use tracing::{debug, warn};

use super::ports::{CalendarGateway, Credential, ProviderEvent};

const WEEKDAYS: [&str; 5] = ["MO", "TU", "WE", "TH", "FR"];
const WEEKEND_DAYS: [&str; 2] = ["SA", "SU"];

/// Classify a set of provider recurrence rules.
///
/// The first rule carrying a `FREQ` term wins. `WEEKLY` rules are refined by
/// their `BYDAY` set; everything unparseable falls back to `Once`.
pub fn classify(rules: &[String]) -> Frequency {
    let Some(rule) = rules.iter().find(|rule| rule.to_ascii_uppercase().contains("FREQ=")) else {
        return Frequency::Once;
    };

    let upper = rule.trim().to_ascii_uppercase();
    let body = upper.strip_prefix("RRULE:").unwrap_or(&upper);

    let mut freq = None;
    let mut by_day: Vec<String> = Vec::new();
    for term in body.split(';') {
        if let Some(value) = term.strip_prefix("FREQ=") {
            freq = Some(value.trim().to_string());
        } else if let Some(value) = term.strip_prefix("BYDAY=") {
            by_day = value.split(',').map(|day| day.trim().to_string()).collect();
        }
    }

    match freq.as_deref() {
        Some("DAILY") => Frequency::Daily,
        Some("WEEKLY") => classify_weekly(&by_day),
        Some("MONTHLY") => Frequency::Monthly,
        Some("YEARLY") => Frequency::Yearly,
        _ => Frequency::Once,
    }
}

fn classify_weekly(by_day: &[String]) -> Frequency {
    // Ordinal prefixes ("1MO", "-1FR") carry no weight for the bucket.
    let days: BTreeSet<&str> = by_day
        .iter()
        .map(|day| day.trim_start_matches(|c: char| c == '+' || c == '-' || c.is_ascii_digit()))
        .filter(|day| !day.is_empty())
        .collect();

    if days.len() == 5 && WEEKDAYS.iter().all(|day| days.contains(day)) {
        return Frequency::WeekDays;
    }
    if days.len() == 2 && WEEKEND_DAYS.iter().all(|day| days.contains(day)) {
        return Frequency::WeekendDays;
    }
    match days.len() {
        0 | 1 => Frequency::Weekly,
        2 => Frequency::BiWeekly,
        _ => Frequency::CustomWeekly,
    }
}

/// Bounded memo of series platform id -> classified frequency.
///
/// Scoped to a single reconciliation pass; never shared across calendars or
/// passes. Once the capacity is reached further results are computed but not
/// retained.
#[derive(Debug)]
pub struct FrequencyCache {
    entries: HashMap<String, Frequency>,
    capacity: usize,
}

impl FrequencyCache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), capacity }
    }

    pub fn get(&self, series_platform_id: &str) -> Option<Frequency> {
        self.entries.get(series_platform_id).copied()
    }

    pub fn insert(&mut self, series_platform_id: String, frequency: Frequency) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&series_platform_id) {
            debug!(capacity = self.capacity, "frequency cache full; not retaining entry");
            return;
        }
        self.entries.insert(series_platform_id, frequency);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve the frequency of an event, consulting its parent series when it
/// is an occurrence of one.
///
/// Parent lookups are memoized in `cache` so N occurrences of one series
/// cost a single provider fetch. A failed lookup is logged and yields
/// `Once` - a stale classification must never abort a sync pass.
pub async fn resolve_series_frequency(
    event: &ProviderEvent,
    series_platform_id: Option<&str>,
    calendar: &Calendar,
    gateway: &dyn CalendarGateway,
    credential: &Credential,
    cache: &mut FrequencyCache,
) -> Frequency {
    let Some(series_id) = series_platform_id else {
        return classify(&event.recurrence);
    };

    if let Some(frequency) = cache.get(series_id) {
        return frequency;
    }

    match gateway.get_series(calendar, credential, series_id).await {
        Ok(series) => {
            let frequency = classify(&series.recurrence);
            cache.insert(series_id.to_string(), frequency);
            frequency
        }
        Err(err) => {
            warn!(
                series_id,
                calendar_id = %calendar.id,
                error = %err,
                "series lookup failed; defaulting frequency to one-off"
            );
            Frequency::Once
        }
    }
}
