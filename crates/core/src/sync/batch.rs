//! Mutation staging for one reconciliation pass
//!
//! The reconciler stages creates/updates/deletes here and hands the whole
//! batch to the Unit-of-Work in one commit. Each staged mutation maps to a
//! domain event; deletion events carry a snapshot of the removed row.

use dayline_domain::{Calendar, CalendarEntry, CalendarEntrySeries};
use serde::{Deserialize, Serialize};

/// Domain event emitted when a staged mutation commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DomainEvent {
    EntryCreated(CalendarEntry),
    EntryUpdated(CalendarEntry),
    /// Snapshot of the entry as it was before deletion.
    EntryDeleted(CalendarEntry),
    SeriesCreated(CalendarEntrySeries),
    SeriesUpdated(CalendarEntrySeries),
    /// Snapshot of the series as it was before deletion.
    SeriesDeleted(CalendarEntrySeries),
    CalendarUpdated(Calendar),
}

/// Counts of entry/series mutations staged by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// All mutations staged by one pass, committed atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationBatch {
    pub entry_creates: Vec<CalendarEntry>,
    pub entry_updates: Vec<CalendarEntry>,
    pub entry_deletes: Vec<CalendarEntry>,
    pub series_creates: Vec<CalendarEntrySeries>,
    pub series_updates: Vec<CalendarEntrySeries>,
    pub series_deletes: Vec<CalendarEntrySeries>,
    pub calendar_updates: Vec<Calendar>,
}

impl MutationBatch {
    pub fn stage_entry_create(&mut self, entry: CalendarEntry) {
        self.entry_creates.push(entry);
    }

    pub fn stage_entry_update(&mut self, entry: CalendarEntry) {
        self.entry_updates.push(entry);
    }

    pub fn stage_entry_delete(&mut self, entry: CalendarEntry) {
        self.entry_deletes.push(entry);
    }

    pub fn stage_series_create(&mut self, series: CalendarEntrySeries) {
        self.series_creates.push(series);
    }

    pub fn stage_series_update(&mut self, series: CalendarEntrySeries) {
        self.series_updates.push(series);
    }

    pub fn stage_series_delete(&mut self, series: CalendarEntrySeries) {
        self.series_deletes.push(series);
    }

    pub fn stage_calendar_update(&mut self, calendar: Calendar) {
        self.calendar_updates.push(calendar);
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.entry_creates.len()
            + self.entry_updates.len()
            + self.entry_deletes.len()
            + self.series_creates.len()
            + self.series_updates.len()
            + self.series_deletes.len()
            + self.calendar_updates.len()
    }

    /// Entry/series mutation counts. Calendar updates (sync-token and
    /// subscription changes) are bookkeeping, not reconciliation output, and
    /// are excluded.
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            created: self.entry_creates.len() + self.series_creates.len(),
            updated: self.entry_updates.len() + self.series_updates.len(),
            deleted: self.entry_deletes.len() + self.series_deletes.len(),
        }
    }

    /// Events for every staged mutation, creation before update before
    /// deletion, series before the entries that reference them.
    pub fn domain_events(&self) -> Vec<DomainEvent> {
        let mut events = Vec::with_capacity(self.len());
        events.extend(self.series_creates.iter().cloned().map(DomainEvent::SeriesCreated));
        events.extend(self.entry_creates.iter().cloned().map(DomainEvent::EntryCreated));
        events.extend(self.series_updates.iter().cloned().map(DomainEvent::SeriesUpdated));
        events.extend(self.entry_updates.iter().cloned().map(DomainEvent::EntryUpdated));
        events.extend(self.entry_deletes.iter().cloned().map(DomainEvent::EntryDeleted));
        events.extend(self.series_deletes.iter().cloned().map(DomainEvent::SeriesDeleted));
        events.extend(self.calendar_updates.iter().cloned().map(DomainEvent::CalendarUpdated));
        events
    }
}
