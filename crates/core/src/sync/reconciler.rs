//! One fetch-map-diff-commit pass for a single calendar
//!
//! The pass works from one consistent provider snapshot: readers never see a
//! partially-reconciled calendar because every staged mutation goes through
//! the Unit-of-Work in a single commit. Passes for the same calendar are
//! assumed single-flight (serialized by the invoking scheduler).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dayline_domain::{Calendar, CalendarEntry, CalendarEntrySeries, Result, SyncConfig};
use tracing::{debug, info, instrument, warn};

use super::batch::{MutationBatch, ReconcileSummary};
use super::mapper::{self, MappedEvent};
use super::ports::{CalendarGateway, Credential, EntryRepository, FetchWindow, UnitOfWork};
use super::recurrence::FrequencyCache;

/// Drives reconciliation passes against local entry/series state.
pub struct Reconciler {
    entries: Arc<dyn EntryRepository>,
    uow: Arc<dyn UnitOfWork>,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(
        entries: Arc<dyn EntryRepository>,
        uow: Arc<dyn UnitOfWork>,
        config: SyncConfig,
    ) -> Self {
        Self { entries, uow, config }
    }

    /// Run one pass for `calendar`. Either the whole batch commits or
    /// nothing does.
    #[instrument(skip(self, gateway, credential), fields(calendar_id = %calendar.id))]
    pub async fn reconcile(
        &self,
        calendar: &Calendar,
        gateway: &Arc<dyn CalendarGateway>,
        credential: &Credential,
    ) -> Result<ReconcileSummary> {
        let now = Utc::now();
        let window = FetchWindow {
            time_min: now - self.config.lookback(),
            time_max: now + self.config.lookahead(),
        };

        let page = gateway.list_events(calendar, credential, window).await?;
        debug!(fetched = page.events.len(), "fetched provider events");

        // Frequency memoization is scoped to this pass only.
        let mut cache = FrequencyCache::new(self.config.frequency_cache_capacity);
        let mut mapped = Vec::with_capacity(page.events.len());
        for event in &page.events {
            match mapper::map_event(
                calendar,
                event,
                gateway.as_ref(),
                credential,
                &mut cache,
                &self.config,
                now,
            )
            .await
            {
                Ok(candidate) => {
                    // Finished occurrences are not worth materializing; the
                    // comparison is against the pass's reference time.
                    if candidate.entry.end < now && !candidate.entry.status.is_cancelled() {
                        debug!(
                            platform_id = %candidate.entry.platform_id,
                            "skipping already-finished event"
                        );
                        continue;
                    }
                    mapped.push(candidate);
                }
                Err(err) => {
                    warn!(event_id = %event.id, error = %err, "skipping unmappable provider event");
                }
            }
        }

        let existing_entries = self.entries.list_entries(&calendar.id).await?;
        let existing_series = self.entries.list_series(&calendar.id).await?;

        let batch = diff(calendar, mapped, existing_entries, existing_series, page.sync_token);
        let summary = batch.summary();

        if batch.is_empty() {
            debug!("pass staged no mutations");
            return Ok(summary);
        }

        self.uow.commit(batch).await?;
        info!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "reconciliation pass committed"
        );

        Ok(summary)
    }
}

/// Diff the mapped snapshot against local state.
///
/// `(calendar_id, platform_id)` is the idempotency key on both entries and
/// series: local ids are preserved across passes, updates are staged only
/// when an observable field changed, and anything local that is absent
/// upstream is tombstoned. Pure computation - no I/O.
fn diff(
    calendar: &Calendar,
    mapped: Vec<MappedEvent>,
    existing_entries: Vec<CalendarEntry>,
    existing_series: Vec<CalendarEntrySeries>,
    sync_token: Option<String>,
) -> MutationBatch {
    let mut batch = MutationBatch::default();

    let entries_by_platform: HashMap<String, CalendarEntry> = existing_entries
        .iter()
        .map(|entry| (entry.platform_id.clone(), entry.clone()))
        .collect();
    let series_by_platform: HashMap<String, CalendarEntrySeries> = existing_series
        .iter()
        .map(|series| (series.platform_id.clone(), series.clone()))
        .collect();

    // Platform ids observed upstream this pass (kept or tombstoned here);
    // everything else is deleted in the absence sweep below.
    let mut handled_entries: HashSet<String> = HashSet::new();
    let mut retained_series: HashSet<String> = HashSet::new();
    let mut updated_series: HashSet<String> = HashSet::new();
    // Series staged for creation this pass: platform id -> local id, so N
    // occurrences share one create.
    let mut created_series: HashMap<String, String> = HashMap::new();

    for MappedEvent { mut entry, series } in mapped {
        // At-least-once delivery can surface the same occurrence twice in
        // one snapshot.
        if !handled_entries.insert(entry.platform_id.clone()) {
            debug!(platform_id = %entry.platform_id, "duplicate occurrence in snapshot");
            continue;
        }

        // Cancelled upstream tombstones the local row even while the
        // provider still lists it.
        if entry.status.is_cancelled() {
            if let Some(existing) = entries_by_platform.get(&entry.platform_id) {
                batch.stage_entry_delete(existing.clone());
            }
            continue;
        }

        if let Some(candidate) = series {
            let local_series_id = match series_by_platform.get(&candidate.platform_id) {
                Some(existing) => {
                    retained_series.insert(existing.platform_id.clone());
                    let mut refreshed = candidate.clone();
                    refreshed.id = existing.id.clone();
                    if !existing.observably_equal(&refreshed)
                        && updated_series.insert(existing.platform_id.clone())
                    {
                        batch.stage_series_update(refreshed);
                    }
                    existing.id.clone()
                }
                None => match created_series.get(&candidate.platform_id) {
                    Some(id) => id.clone(),
                    None => {
                        created_series
                            .insert(candidate.platform_id.clone(), candidate.id.clone());
                        let id = candidate.id.clone();
                        batch.stage_series_create(candidate);
                        id
                    }
                },
            };
            entry.series_id = Some(local_series_id);
        }

        match entries_by_platform.get(&entry.platform_id) {
            Some(existing) => {
                // Upsert: the local id survives as long as the platform id
                // does.
                entry.id = existing.id.clone();
                if !existing.observably_equal(&entry) {
                    batch.stage_entry_update(entry);
                }
            }
            None => batch.stage_entry_create(entry),
        }
    }

    // Absence upstream means deletion locally.
    for entry in existing_entries {
        if !handled_entries.contains(&entry.platform_id) {
            batch.stage_entry_delete(entry);
        }
    }
    for series in existing_series {
        if !retained_series.contains(&series.platform_id) {
            batch.stage_series_delete(series);
        }
    }

    // Persist a newly observed incremental-fetch cursor on the calendar's
    // subscription.
    if let (Some(token), Some(subscription)) = (sync_token, calendar.sync_subscription.as_ref())
    {
        if subscription.sync_token.as_deref() != Some(token.as_str()) {
            let mut updated = calendar.clone();
            if let Some(subscription) = updated.sync_subscription.as_mut() {
                subscription.sync_token = Some(token);
            }
            batch.stage_calendar_update(updated);
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use dayline_domain::{EntryStatus, Frequency};

    use super::*;

    fn calendar() -> Calendar {
        Calendar {
            id: "cal-1".into(),
            user_id: "user-1".into(),
            name: "Work".into(),
            auth_token_id: "token-1".into(),
            provider: "google".into(),
            platform_id: "primary".into(),
            sync_subscription: None,
        }
    }

    fn mapped(platform_id: &str, name: &str) -> MappedEvent {
        let now = Utc::now();
        MappedEvent {
            entry: CalendarEntry {
                id: format!("fresh-{platform_id}"),
                calendar_id: "cal-1".into(),
                series_id: None,
                platform_id: platform_id.into(),
                name: name.into(),
                status: EntryStatus::Confirmed,
                start: now + Duration::hours(1),
                end: now + Duration::hours(2),
                frequency: Frequency::Once,
            },
            series: None,
        }
    }

    fn existing(platform_id: &str, name: &str) -> CalendarEntry {
        CalendarEntry { id: format!("local-{platform_id}"), ..mapped(platform_id, name).entry }
    }

    #[test]
    fn unchanged_snapshot_stages_nothing() {
        let snapshot = mapped("evt-1", "Standup");
        let local = CalendarEntry { id: "local-1".into(), ..snapshot.entry.clone() };

        let batch = diff(&calendar(), vec![snapshot], vec![local], Vec::new(), None);
        assert!(batch.is_empty());
    }

    #[test]
    fn renamed_event_stages_update_preserving_local_id() {
        let snapshot = mapped("evt-1", "Standup (moved)");
        let local = existing("evt-1", "Standup");

        let batch = diff(&calendar(), vec![snapshot], vec![local], Vec::new(), None);
        assert_eq!(batch.entry_updates.len(), 1);
        assert_eq!(batch.entry_updates[0].id, "local-evt-1");
        assert!(batch.entry_creates.is_empty());
        assert!(batch.entry_deletes.is_empty());
    }

    #[test]
    fn absent_upstream_is_tombstoned() {
        let local = existing("evt-gone", "Old meeting");

        let batch = diff(&calendar(), Vec::new(), vec![local], Vec::new(), None);
        assert_eq!(batch.entry_deletes.len(), 1);
        assert_eq!(batch.entry_deletes[0].platform_id, "evt-gone");
    }

    #[test]
    fn cancelled_upstream_is_tombstoned_even_while_listed() {
        let mut snapshot = mapped("evt-1", "Standup");
        snapshot.entry.status = EntryStatus::Cancelled;
        let local = existing("evt-1", "Standup");

        let batch = diff(&calendar(), vec![snapshot], vec![local], Vec::new(), None);
        assert_eq!(batch.entry_deletes.len(), 1);
        assert!(batch.entry_creates.is_empty());
        assert!(batch.entry_updates.is_empty());
    }

    #[test]
    fn cancelled_unknown_event_is_ignored() {
        let mut snapshot = mapped("evt-unknown", "Ghost");
        snapshot.entry.status = EntryStatus::Cancelled;

        let batch = diff(&calendar(), vec![snapshot], Vec::new(), Vec::new(), None);
        assert!(batch.is_empty());
    }

    #[test]
    fn two_occurrences_share_one_series_create() {
        let series = CalendarEntrySeries {
            id: "fresh-series".into(),
            calendar_id: "cal-1".into(),
            platform_id: "series123".into(),
            name: "Standup".into(),
            frequency: Frequency::WeekDays,
        };
        let mut first = mapped("series123_1", "Standup");
        first.series = Some(series.clone());
        let mut second = mapped("series123_2", "Standup");
        second.series = Some(CalendarEntrySeries { id: "fresh-series-2".into(), ..series });

        let batch = diff(&calendar(), vec![first, second], Vec::new(), Vec::new(), None);
        assert_eq!(batch.series_creates.len(), 1);
        assert_eq!(batch.entry_creates.len(), 2);

        let series_id = &batch.series_creates[0].id;
        for entry in &batch.entry_creates {
            assert_eq!(entry.series_id.as_ref(), Some(series_id));
        }
    }

    #[test]
    fn orphaned_series_is_tombstoned() {
        let series = CalendarEntrySeries {
            id: "local-series".into(),
            calendar_id: "cal-1".into(),
            platform_id: "series-gone".into(),
            name: "Retro".into(),
            frequency: Frequency::Weekly,
        };

        let batch = diff(&calendar(), Vec::new(), Vec::new(), vec![series], None);
        assert_eq!(batch.series_deletes.len(), 1);
        assert_eq!(batch.series_deletes[0].platform_id, "series-gone");
    }

    #[test]
    fn duplicate_occurrences_in_one_snapshot_collapse() {
        let batch = diff(
            &calendar(),
            vec![mapped("evt-1", "Standup"), mapped("evt-1", "Standup")],
            Vec::new(),
            Vec::new(),
            None,
        );
        assert_eq!(batch.entry_creates.len(), 1);
    }

    #[test]
    fn sync_token_is_staged_only_when_changed() {
        let mut with_subscription = calendar();
        with_subscription.sync_subscription = Some(dayline_domain::SyncSubscription {
            subscription_id: "chan-1".into(),
            resource_id: "res-1".into(),
            expiration: Utc::now() + Duration::days(7),
            provider: "google".into(),
            client_state: "state".into(),
            sync_token: Some("cursor-1".into()),
            webhook_url: "https://example.com/hook".into(),
        });

        let unchanged = diff(
            &with_subscription,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Some("cursor-1".into()),
        );
        assert!(unchanged.calendar_updates.is_empty());

        let changed = diff(
            &with_subscription,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Some("cursor-2".into()),
        );
        assert_eq!(changed.calendar_updates.len(), 1);
        let staged = changed.calendar_updates[0]
            .sync_subscription
            .as_ref()
            .and_then(|subscription| subscription.sync_token.as_deref());
        assert_eq!(staged, Some("cursor-2"));
    }

    #[test]
    fn token_without_subscription_has_nowhere_to_go() {
        let batch = diff(&calendar(), Vec::new(), Vec::new(), Vec::new(), Some("cursor".into()));
        assert!(batch.calendar_updates.is_empty());
    }
}
