//! Sync orchestration commands
//!
//! The externally-invoked workflows: subscribe, unsubscribe, sync, sync-all,
//! resync, reset-sync and reset-data. Each command loads the calendar and its
//! auth token through read-only repositories, resolves the provider gateway
//! once, obtains one refreshed-or-valid credential for the whole pass and
//! commits through the Unit-of-Work.

use std::sync::Arc;

use dayline_domain::{Calendar, DaylineError, Result, SyncConfig};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::batch::ReconcileSummary;
use super::ports::{
    AuthTokenRepository, CalendarGateway, CalendarRepository, Credential, CredentialStore,
    EntryRepository, UnitOfWork,
};
use super::reconciler::Reconciler;
use super::registry::GatewayRegistry;
use super::subscription::SubscriptionManager;

/// Per-calendar outcome of a fan-out sync.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarSyncReport {
    pub calendar_id: String,
    pub summary: Option<ReconcileSummary>,
    pub error: Option<String>,
}

impl CalendarSyncReport {
    fn completed(calendar_id: String, summary: ReconcileSummary) -> Self {
        Self { calendar_id, summary: Some(summary), error: None }
    }

    fn failed(calendar_id: String, err: &DaylineError) -> Self {
        Self { calendar_id, summary: None, error: Some(err.to_string()) }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Orchestrates the sync engine's externally-invoked workflows.
pub struct CalendarSyncService {
    calendars: Arc<dyn CalendarRepository>,
    tokens: Arc<dyn AuthTokenRepository>,
    credentials: Arc<dyn CredentialStore>,
    registry: Arc<GatewayRegistry>,
    reconciler: Reconciler,
    subscriptions: SubscriptionManager,
}

impl CalendarSyncService {
    pub fn new(
        calendars: Arc<dyn CalendarRepository>,
        tokens: Arc<dyn AuthTokenRepository>,
        entries: Arc<dyn EntryRepository>,
        uow: Arc<dyn UnitOfWork>,
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<GatewayRegistry>,
        config: SyncConfig,
    ) -> Self {
        let reconciler = Reconciler::new(entries.clone(), uow.clone(), config.clone());
        let subscriptions = SubscriptionManager::new(entries, uow, config);
        Self { calendars, tokens, credentials, registry, reconciler, subscriptions }
    }

    /// Install a webhook channel for the calendar.
    #[instrument(skip(self))]
    pub async fn subscribe_calendar(&self, calendar_id: &str) -> Result<Calendar> {
        let (calendar, gateway, credential) = self.load_context(calendar_id).await?;
        self.subscriptions.subscribe(&calendar, &gateway, &credential).await
    }

    /// Tear down the calendar's webhook channel.
    #[instrument(skip(self))]
    pub async fn unsubscribe_calendar(&self, calendar_id: &str) -> Result<Calendar> {
        let (calendar, gateway, credential) = self.load_context(calendar_id).await?;
        self.subscriptions.unsubscribe(&calendar, &gateway, &credential).await
    }

    /// Run one reconciliation pass for the calendar.
    #[instrument(skip(self))]
    pub async fn sync_calendar(&self, calendar_id: &str) -> Result<ReconcileSummary> {
        let (calendar, gateway, credential) = self.load_context(calendar_id).await?;
        self.reconciler.reconcile(&calendar, &gateway, &credential).await
    }

    /// Run one pass per calendar of the user. One calendar's failure never
    /// aborts the fan-out; it is reported and the sweep continues.
    #[instrument(skip(self))]
    pub async fn sync_all_calendars(&self, user_id: &str) -> Result<Vec<CalendarSyncReport>> {
        let calendars = self.calendars.list_calendars_for_user(user_id).await?;
        let mut reports = Vec::with_capacity(calendars.len());

        for calendar in calendars {
            let report = match self.sync_one(&calendar).await {
                Ok(summary) => CalendarSyncReport::completed(calendar.id.clone(), summary),
                Err(err) => {
                    warn!(calendar_id = %calendar.id, error = %err, "calendar sync failed");
                    CalendarSyncReport::failed(calendar.id.clone(), &err)
                }
            };
            reports.push(report);
        }

        info!(
            total = reports.len(),
            failed = reports.iter().filter(|r| !r.succeeded()).count(),
            "user sync fan-out completed"
        );
        Ok(reports)
    }

    /// Full resynchronization: replace the channel, purge local data, run a
    /// fresh pass against the clean slate.
    #[instrument(skip(self))]
    pub async fn resync_calendar(&self, calendar_id: &str) -> Result<ReconcileSummary> {
        let (calendar, gateway, credential) = self.load_context(calendar_id).await?;

        let calendar = self.subscriptions.teardown(&calendar, &gateway, &credential).await?;
        self.subscriptions.purge_local_data(&calendar).await?;
        let calendar = self.subscriptions.subscribe(&calendar, &gateway, &credential).await?;

        self.reconciler.reconcile(&calendar, &gateway, &credential).await
    }

    /// Lighter variant of [`resync_calendar`](Self::resync_calendar):
    /// replace the subscription and reconcile, keeping local data in place.
    #[instrument(skip(self))]
    pub async fn reset_calendar_sync(&self, calendar_id: &str) -> Result<ReconcileSummary> {
        let (calendar, gateway, credential) = self.load_context(calendar_id).await?;

        let calendar = self.subscriptions.renew(&calendar, &gateway, &credential).await?;
        self.reconciler.reconcile(&calendar, &gateway, &credential).await
    }

    /// For every calendar with an active subscription: tear the channel
    /// down, purge local entries/series and install a fresh channel. Returns
    /// the ids of the calendars that were reset so the caller can trigger
    /// full resyncs. Calendars without a subscription are left untouched.
    #[instrument(skip(self))]
    pub async fn reset_calendar_data(&self) -> Result<Vec<String>> {
        let calendars = self.calendars.list_subscribed_calendars().await?;
        let mut reset_ids = Vec::new();

        for calendar in calendars {
            if calendar.sync_subscription.is_none() {
                continue;
            }
            match self.reset_one(&calendar).await {
                Ok(()) => reset_ids.push(calendar.id.clone()),
                Err(err) => {
                    warn!(calendar_id = %calendar.id, error = %err, "calendar data reset failed");
                }
            }
        }

        info!(reset = reset_ids.len(), "calendar data reset completed");
        Ok(reset_ids)
    }

    /// Renew every subscription within the expiry threshold. Returns the ids
    /// of calendars whose channel was replaced.
    #[instrument(skip(self))]
    pub async fn renew_expiring_subscriptions(&self) -> Result<Vec<String>> {
        let calendars = self.calendars.list_subscribed_calendars().await?;
        let mut renewed = Vec::new();

        for calendar in calendars {
            if !self.subscriptions.needs_renewal(&calendar) {
                continue;
            }
            match self.renew_one(&calendar).await {
                Ok(()) => renewed.push(calendar.id.clone()),
                Err(err) => {
                    warn!(
                        calendar_id = %calendar.id,
                        error = %err,
                        "subscription renewal failed; will retry next sweep"
                    );
                }
            }
        }

        Ok(renewed)
    }

    async fn sync_one(&self, calendar: &Calendar) -> Result<ReconcileSummary> {
        let (gateway, credential) = self.context_for(calendar).await?;
        self.reconciler.reconcile(calendar, &gateway, &credential).await
    }

    async fn reset_one(&self, calendar: &Calendar) -> Result<()> {
        let (gateway, credential) = self.context_for(calendar).await?;
        let calendar = self.subscriptions.teardown(calendar, &gateway, &credential).await?;
        self.subscriptions.purge_local_data(&calendar).await?;
        self.subscriptions.subscribe(&calendar, &gateway, &credential).await?;
        Ok(())
    }

    async fn renew_one(&self, calendar: &Calendar) -> Result<()> {
        let (gateway, credential) = self.context_for(calendar).await?;
        self.subscriptions.renew(calendar, &gateway, &credential).await?;
        Ok(())
    }

    async fn load_context(
        &self,
        calendar_id: &str,
    ) -> Result<(Calendar, Arc<dyn CalendarGateway>, Credential)> {
        let calendar = self.calendars.find_calendar(calendar_id).await?;
        let (gateway, credential) = self.context_for(&calendar).await?;
        Ok((calendar, gateway, credential))
    }

    /// Resolve the gateway before touching credentials so an unsupported
    /// platform fails fast, and refresh the credential exactly once per
    /// pass.
    async fn context_for(
        &self,
        calendar: &Calendar,
    ) -> Result<(Arc<dyn CalendarGateway>, Credential)> {
        let gateway = self.registry.resolve(&calendar.provider)?;
        let token = self.tokens.find_auth_token(&calendar.auth_token_id).await?;
        let credential = self.credentials.ensure_valid(&token).await?;
        Ok((gateway, credential))
    }
}
