//! Calendar synchronization engine
//!
//! One reconciliation pass per calendar: fetch a bounded window of provider
//! events, map them to local entries/series, diff against local state by
//! `(calendar_id, platform_id)`, and commit the staged mutations through the
//! Unit-of-Work as a single batch. Webhook subscription lifecycle lives next
//! to it so remote changes are pushed rather than polled.

pub mod batch;
pub mod mapper;
pub mod ports;
pub mod reconciler;
pub mod recurrence;
pub mod registry;
pub mod service;
pub mod subscription;
