//! In-memory mock ports for sync engine integration tests
//!
//! Provides deterministic implementations of every port the engine consumes:
//! shared-state repositories, a Unit-of-Work that applies batches atomically,
//! a scriptable provider gateway and credential stores for both the happy
//! and the expired-token path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dayline_core::{
    AuthTokenRepository, CalendarGateway, CalendarRepository, CalendarSyncService, Credential,
    CredentialStore, DomainEvent, EntryRepository, EventPage, FetchWindow, GatewayRegistry,
    MutationBatch, ProviderCalendar, ProviderEvent, UnitOfWork,
};
use dayline_domain::{
    AuthToken, Calendar, CalendarEntry, CalendarEntrySeries, DaylineError, Result, SyncConfig,
    SyncSubscription,
};
use serde_json::json;

/// Backing state shared by the mock repositories and the Unit-of-Work.
#[derive(Default)]
pub struct StoreState {
    pub calendars: HashMap<String, Calendar>,
    pub tokens: HashMap<String, AuthToken>,
    pub entries: HashMap<String, CalendarEntry>,
    pub series: HashMap<String, CalendarEntrySeries>,
    pub events: Vec<DomainEvent>,
}

pub type SharedStore = Arc<Mutex<StoreState>>;

pub fn shared_store() -> SharedStore {
    Arc::new(Mutex::new(StoreState::default()))
}

/// Read-only repository views over the shared state.
#[derive(Clone)]
pub struct InMemoryRepositories {
    state: SharedStore,
}

impl InMemoryRepositories {
    pub fn new(state: SharedStore) -> Self {
        Self { state }
    }
}

#[async_trait]
impl CalendarRepository for InMemoryRepositories {
    async fn find_calendar(&self, calendar_id: &str) -> Result<Calendar> {
        self.state
            .lock()
            .unwrap()
            .calendars
            .get(calendar_id)
            .cloned()
            .ok_or_else(|| DaylineError::NotFound(format!("calendar {calendar_id}")))
    }

    async fn list_calendars_for_user(&self, user_id: &str) -> Result<Vec<Calendar>> {
        let mut calendars: Vec<Calendar> = self
            .state
            .lock()
            .unwrap()
            .calendars
            .values()
            .filter(|calendar| calendar.user_id == user_id)
            .cloned()
            .collect();
        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }

    async fn list_subscribed_calendars(&self) -> Result<Vec<Calendar>> {
        let mut calendars: Vec<Calendar> = self
            .state
            .lock()
            .unwrap()
            .calendars
            .values()
            .filter(|calendar| calendar.is_subscribed())
            .cloned()
            .collect();
        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }
}

#[async_trait]
impl AuthTokenRepository for InMemoryRepositories {
    async fn find_auth_token(&self, token_id: &str) -> Result<AuthToken> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(token_id)
            .cloned()
            .ok_or_else(|| DaylineError::NotFound(format!("auth token {token_id}")))
    }
}

#[async_trait]
impl EntryRepository for InMemoryRepositories {
    async fn list_entries(&self, calendar_id: &str) -> Result<Vec<CalendarEntry>> {
        let mut entries: Vec<CalendarEntry> = self
            .state
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|entry| entry.calendar_id == calendar_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.platform_id.cmp(&b.platform_id));
        Ok(entries)
    }

    async fn list_series(&self, calendar_id: &str) -> Result<Vec<CalendarEntrySeries>> {
        let mut series: Vec<CalendarEntrySeries> = self
            .state
            .lock()
            .unwrap()
            .series
            .values()
            .filter(|series| series.calendar_id == calendar_id)
            .cloned()
            .collect();
        series.sort_by(|a, b| a.platform_id.cmp(&b.platform_id));
        Ok(series)
    }
}

/// Unit-of-Work that applies a batch to the shared state all-or-nothing and
/// records the emitted domain events.
pub struct InMemoryUnitOfWork {
    state: SharedStore,
    fail_next_commit: AtomicBool,
    pub commits: AtomicUsize,
}

impl InMemoryUnitOfWork {
    pub fn new(state: SharedStore) -> Self {
        Self { state, fail_next_commit: AtomicBool::new(false), commits: AtomicUsize::new(0) }
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(&self, batch: MutationBatch) -> Result<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DaylineError::Storage("injected commit failure".into()));
        }

        let events = batch.domain_events();
        let mut state = self.state.lock().unwrap();

        for series in batch.series_creates {
            state.series.insert(series.id.clone(), series);
        }
        for series in batch.series_updates {
            state.series.insert(series.id.clone(), series);
        }
        for entry in batch.entry_creates {
            state.entries.insert(entry.id.clone(), entry);
        }
        for entry in batch.entry_updates {
            state.entries.insert(entry.id.clone(), entry);
        }
        for entry in batch.entry_deletes {
            state.entries.remove(&entry.id);
        }
        for series in batch.series_deletes {
            state.series.remove(&series.id);
        }
        for calendar in batch.calendar_updates {
            state.calendars.insert(calendar.id.clone(), calendar);
        }

        state.events.extend(events);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scriptable gateway: serves a configurable event snapshot, counts parent
/// lookups and hands out sequentially numbered webhook channels.
#[derive(Default)]
pub struct StubGateway {
    events: Mutex<Vec<ProviderEvent>>,
    sync_token: Mutex<Option<String>>,
    series_payloads: Mutex<HashMap<String, ProviderEvent>>,
    pub series_lookups: AtomicUsize,
    pub watch_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    fail_stop: AtomicBool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_events(&self, events: Vec<ProviderEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn set_sync_token(&self, token: Option<&str>) {
        *self.sync_token.lock().unwrap() = token.map(String::from);
    }

    pub fn add_series(&self, series: ProviderEvent) {
        self.series_payloads.lock().unwrap().insert(series.id.clone(), series);
    }

    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarGateway for StubGateway {
    async fn list_calendars(&self, _credential: &Credential) -> Result<Vec<ProviderCalendar>> {
        Ok(Vec::new())
    }

    async fn list_events(
        &self,
        _calendar: &Calendar,
        _credential: &Credential,
        _window: FetchWindow,
    ) -> Result<EventPage> {
        Ok(EventPage {
            events: self.events.lock().unwrap().clone(),
            sync_token: self.sync_token.lock().unwrap().clone(),
        })
    }

    async fn get_series(
        &self,
        _calendar: &Calendar,
        _credential: &Credential,
        series_id: &str,
    ) -> Result<ProviderEvent> {
        self.series_lookups.fetch_add(1, Ordering::SeqCst);
        self.series_payloads
            .lock()
            .unwrap()
            .get(series_id)
            .cloned()
            .ok_or_else(|| DaylineError::NotFound(format!("series {series_id}")))
    }

    async fn watch(
        &self,
        calendar: &Calendar,
        _credential: &Credential,
        webhook_url: &str,
        client_state: &str,
    ) -> Result<SyncSubscription> {
        let n = self.watch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SyncSubscription {
            subscription_id: format!("chan-{n}"),
            resource_id: format!("res-{n}"),
            expiration: Utc::now() + Duration::days(7),
            provider: calendar.provider.clone(),
            client_state: client_state.to_string(),
            sync_token: None,
            webhook_url: webhook_url.to_string(),
        })
    }

    async fn stop(&self, _credential: &Credential, _subscription: &SyncSubscription) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.swap(false, Ordering::SeqCst) {
            return Err(DaylineError::Provider("channel already expired (404)".into()));
        }
        Ok(())
    }
}

/// Credential store that trusts the stored access token as-is.
pub struct StaticCredentialStore;

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn ensure_valid(&self, token: &AuthToken) -> Result<Credential> {
        Ok(Credential { access_token: token.access_token.clone(), expires_at: token.expires_at })
    }
}

/// Credential store whose refresh always fails terminally.
pub struct ExpiredCredentialStore;

#[async_trait]
impl CredentialStore for ExpiredCredentialStore {
    async fn ensure_valid(&self, token: &AuthToken) -> Result<Credential> {
        Err(DaylineError::TokenExpired(format!("refresh rejected for token {}", token.id)))
    }
}

/// Everything a test needs to drive the orchestration commands.
pub struct TestHarness {
    pub state: SharedStore,
    pub gateway: Arc<StubGateway>,
    pub uow: Arc<InMemoryUnitOfWork>,
    pub service: CalendarSyncService,
}

pub fn harness() -> TestHarness {
    harness_with(SyncConfig::default(), Arc::new(StaticCredentialStore))
}

pub fn harness_with(
    config: SyncConfig,
    credentials: Arc<dyn CredentialStore>,
) -> TestHarness {
    let state = shared_store();
    let repositories = InMemoryRepositories::new(state.clone());
    let gateway = Arc::new(StubGateway::new());
    let uow = Arc::new(InMemoryUnitOfWork::new(state.clone()));
    let gateway_port: Arc<dyn CalendarGateway> = gateway.clone();
    let registry = Arc::new(GatewayRegistry::new().with("google", gateway_port));

    let service = CalendarSyncService::new(
        Arc::new(repositories.clone()),
        Arc::new(repositories.clone()),
        Arc::new(repositories),
        uow.clone(),
        credentials,
        registry,
        config,
    );

    TestHarness { state, gateway, uow, service }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn seed_calendar(store: &SharedStore, id: &str, provider: &str, subscribed: bool) -> Calendar {
    let calendar = Calendar {
        id: id.to_string(),
        user_id: "user-1".into(),
        name: format!("Calendar {id}"),
        auth_token_id: "token-1".into(),
        provider: provider.to_string(),
        platform_id: format!("platform-{id}"),
        sync_subscription: subscribed.then(|| SyncSubscription {
            subscription_id: format!("chan-old-{id}"),
            resource_id: format!("res-old-{id}"),
            expiration: Utc::now() + Duration::days(3),
            provider: provider.to_string(),
            client_state: "old-state".into(),
            sync_token: None,
            webhook_url: "https://example.com/hook".into(),
        }),
    };

    let mut state = store.lock().unwrap();
    state.calendars.insert(calendar.id.clone(), calendar.clone());
    state.tokens.entry("token-1".to_string()).or_insert_with(|| AuthToken {
        id: "token-1".into(),
        user_id: "user-1".into(),
        provider: provider.to_string(),
        access_token: "access".into(),
        refresh_token: Some("refresh".into()),
        token_endpoint: "https://oauth.example.com/token".into(),
        client_id: "client".into(),
        client_secret: Some("secret".into()),
        scopes: vec!["calendar.readonly".into()],
        expires_at: Utc::now() + Duration::hours(1),
    });
    calendar
}

pub fn seed_entry(store: &SharedStore, calendar_id: &str, platform_id: &str) -> CalendarEntry {
    let now = Utc::now();
    let entry = CalendarEntry {
        id: format!("local-{platform_id}"),
        calendar_id: calendar_id.to_string(),
        series_id: None,
        platform_id: platform_id.to_string(),
        name: "Seeded entry".into(),
        status: dayline_domain::EntryStatus::Confirmed,
        start: now + Duration::hours(1),
        end: now + Duration::hours(2),
        frequency: dayline_domain::Frequency::Once,
    };
    store.lock().unwrap().entries.insert(entry.id.clone(), entry.clone());
    entry
}

pub fn seed_series(store: &SharedStore, calendar_id: &str, platform_id: &str) -> CalendarEntrySeries {
    let series = CalendarEntrySeries {
        id: format!("local-series-{platform_id}"),
        calendar_id: calendar_id.to_string(),
        platform_id: platform_id.to_string(),
        name: "Seeded series".into(),
        frequency: dayline_domain::Frequency::Weekly,
    };
    store.lock().unwrap().series.insert(series.id.clone(), series.clone());
    series
}

/// A confirmed one-off event inside the default fetch window.
pub fn provider_event(id: &str, summary: &str) -> ProviderEvent {
    provider_event_at(id, summary, Utc::now() + Duration::hours(2))
}

pub fn provider_event_at(id: &str, summary: &str, start: DateTime<Utc>) -> ProviderEvent {
    ProviderEvent {
        id: id.to_string(),
        summary: Some(summary.to_string()),
        status: Some("confirmed".into()),
        start: json!(start.to_rfc3339()),
        end: json!((start + Duration::hours(1)).to_rfc3339()),
        ..ProviderEvent::default()
    }
}

/// An occurrence of a recurring series.
pub fn occurrence(series_id: &str, suffix: &str, summary: &str) -> ProviderEvent {
    ProviderEvent {
        series_master_id: Some(series_id.to_string()),
        ..provider_event(&format!("{series_id}_{suffix}"), summary)
    }
}

/// A series parent payload with the given recurrence rules.
pub fn series_payload(series_id: &str, rules: &[&str]) -> ProviderEvent {
    ProviderEvent {
        id: series_id.to_string(),
        summary: Some("Series parent".into()),
        recurrence: rules.iter().map(|rule| rule.to_string()).collect(),
        ..ProviderEvent::default()
    }
}
