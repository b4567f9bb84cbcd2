//! Webhook subscription lifecycle
//!
//! A calendar holds at most one active channel: `NONE -> SUBSCRIBED ->
//! (renew) SUBSCRIBED' -> NONE`. Teardown is best-effort - a channel the
//! provider already expired is not worth surfacing - but local state is
//! always cleared so it never points at a dead channel.

use std::sync::Arc;

use chrono::Utc;
use dayline_domain::{Calendar, DaylineError, Result, SyncConfig};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::batch::MutationBatch;
use super::ports::{CalendarGateway, Credential, EntryRepository, UnitOfWork};

/// Manages webhook channel state transitions for calendars.
pub struct SubscriptionManager {
    entries: Arc<dyn EntryRepository>,
    uow: Arc<dyn UnitOfWork>,
    config: SyncConfig,
}

impl SubscriptionManager {
    pub fn new(
        entries: Arc<dyn EntryRepository>,
        uow: Arc<dyn UnitOfWork>,
        config: SyncConfig,
    ) -> Self {
        Self { entries, uow, config }
    }

    /// Install a webhook channel on a calendar that has none.
    #[instrument(skip(self, gateway, credential), fields(calendar_id = %calendar.id))]
    pub async fn subscribe(
        &self,
        calendar: &Calendar,
        gateway: &Arc<dyn CalendarGateway>,
        credential: &Credential,
    ) -> Result<Calendar> {
        if calendar.sync_subscription.is_some() {
            return Err(DaylineError::InvalidInput(format!(
                "calendar {} already has an active subscription",
                calendar.id
            )));
        }

        let client_state = Uuid::new_v4().to_string();
        let subscription = gateway
            .watch(calendar, credential, &self.config.webhook_url, &client_state)
            .await?;

        let mut updated = calendar.clone();
        updated.sync_subscription = Some(subscription);
        self.commit_calendar(updated.clone()).await?;

        info!("webhook subscription installed");
        Ok(updated)
    }

    /// Tear down the current channel. Requires an active subscription.
    #[instrument(skip(self, gateway, credential), fields(calendar_id = %calendar.id))]
    pub async fn unsubscribe(
        &self,
        calendar: &Calendar,
        gateway: &Arc<dyn CalendarGateway>,
        credential: &Credential,
    ) -> Result<Calendar> {
        if calendar.sync_subscription.is_none() {
            return Err(DaylineError::InvalidInput(format!(
                "calendar {} has no active subscription",
                calendar.id
            )));
        }
        self.teardown(calendar, gateway, credential).await
    }

    /// Best-effort teardown: stop the channel if one exists and clear the
    /// local subscription state regardless of the provider's answer.
    pub async fn teardown(
        &self,
        calendar: &Calendar,
        gateway: &Arc<dyn CalendarGateway>,
        credential: &Credential,
    ) -> Result<Calendar> {
        let Some(subscription) = calendar.sync_subscription.as_ref() else {
            return Ok(calendar.clone());
        };

        if let Err(err) = gateway.stop(credential, subscription).await {
            warn!(
                calendar_id = %calendar.id,
                subscription_id = %subscription.subscription_id,
                error = %err,
                "provider rejected channel stop; clearing local subscription anyway"
            );
        }

        let mut updated = calendar.clone();
        updated.sync_subscription = None;
        self.commit_calendar(updated.clone()).await?;

        info!(calendar_id = %calendar.id, "webhook subscription cleared");
        Ok(updated)
    }

    /// Replace the channel in place: stop the old one (best-effort), install
    /// a fresh one, persist the swap as one calendar update.
    #[instrument(skip(self, gateway, credential), fields(calendar_id = %calendar.id))]
    pub async fn renew(
        &self,
        calendar: &Calendar,
        gateway: &Arc<dyn CalendarGateway>,
        credential: &Credential,
    ) -> Result<Calendar> {
        if let Some(old) = calendar.sync_subscription.as_ref() {
            if let Err(err) = gateway.stop(credential, old).await {
                warn!(
                    calendar_id = %calendar.id,
                    subscription_id = %old.subscription_id,
                    error = %err,
                    "stale channel stop failed during renewal"
                );
            }
        }

        let client_state = Uuid::new_v4().to_string();
        let subscription = gateway
            .watch(calendar, credential, &self.config.webhook_url, &client_state)
            .await?;

        let mut updated = calendar.clone();
        updated.sync_subscription = Some(subscription);
        self.commit_calendar(updated.clone()).await?;

        info!("webhook subscription renewed");
        Ok(updated)
    }

    /// Whether the calendar's channel lease is close enough to expiry for
    /// the renewal sweep to act.
    pub fn needs_renewal(&self, calendar: &Calendar) -> bool {
        calendar
            .sync_subscription
            .as_ref()
            .is_some_and(|s| s.expires_within(self.config.renewal_threshold(), Utc::now()))
    }

    /// Delete every local entry and series of the calendar in one commit.
    /// Returns `(entries, series)` counts.
    pub async fn purge_local_data(&self, calendar: &Calendar) -> Result<(usize, usize)> {
        let entries = self.entries.list_entries(&calendar.id).await?;
        let series = self.entries.list_series(&calendar.id).await?;

        if entries.is_empty() && series.is_empty() {
            debug!(calendar_id = %calendar.id, "no local data to purge");
            return Ok((0, 0));
        }

        let mut batch = MutationBatch::default();
        let counts = (entries.len(), series.len());
        for entry in entries {
            batch.stage_entry_delete(entry);
        }
        for series in series {
            batch.stage_series_delete(series);
        }
        self.uow.commit(batch).await?;

        info!(
            calendar_id = %calendar.id,
            entries = counts.0,
            series = counts.1,
            "purged local calendar data"
        );
        Ok(counts)
    }

    async fn commit_calendar(&self, calendar: Calendar) -> Result<()> {
        let mut batch = MutationBatch::default();
        batch.stage_calendar_update(calendar);
        self.uow.commit(batch).await
    }
}
