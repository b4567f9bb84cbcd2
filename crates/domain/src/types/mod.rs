//! Domain data types

pub mod calendar;

pub use calendar::{
    AuthToken, Calendar, CalendarEntry, CalendarEntrySeries, EntryStatus, Frequency,
    SyncSubscription,
};
