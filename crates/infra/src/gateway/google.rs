//! Google Calendar gateway implementation
//!
//! Thin protocol boundary over the Google Calendar v3 API: list/get/watch/
//! stop, with pagination followed internally and Google payload shapes kept
//! out of the rest of the engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dayline_core::{
    CalendarGateway, Credential, EventPage, FetchWindow, ProviderCalendar, ProviderEvent,
};
use dayline_domain::{Calendar, DaylineError, Result, SyncSubscription};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::retry::RetryPolicy;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Calendar provider gateway.
pub struct GoogleCalendarGateway {
    client: Client,
    api_base: String,
    retry: RetryPolicy,
}

impl Default for GoogleCalendarGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCalendarGateway {
    pub fn new() -> Self {
        Self::with_base_url(GOOGLE_CALENDAR_API_BASE)
    }

    /// Point the gateway at a different API base (tests, proxies).
    pub fn with_base_url(api_base: impl Into<String>) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { client, api_base: api_base.into(), retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send a request, retrying transport errors, 429 and 5xx with capped
    /// exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let transient = status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if transient && attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.backoff_delay(attempt);
                        debug!(%status, attempt, delay_ms = delay.as_millis() as u64, "retrying provider request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.backoff_delay(attempt);
                        warn!(error = %err, attempt, "provider request failed; retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DaylineError::Network(format!(
                        "Google API request failed: {err}"
                    )));
                }
            }
        }
    }

    /// Check the response status and deserialize the body.
    async fn parse_success<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &body, context));
        }

        response.json::<T>().await.map_err(|err| {
            DaylineError::InvalidInput(format!("failed to parse Google response ({context}): {err}"))
        })
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarGateway {
    async fn list_calendars(&self, credential: &Credential) -> Result<Vec<ProviderCalendar>> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response = self
            .send_with_retry(|| self.client.get(&url).bearer_auth(&credential.access_token))
            .await?;
        let payload: GoogleCalendarListResponse =
            Self::parse_success(response, "list calendars").await?;

        Ok(payload
            .items
            .into_iter()
            .map(|item| ProviderCalendar {
                id: item.id,
                name: item.summary.unwrap_or_default(),
                primary: item.primary.unwrap_or(false),
            })
            .collect())
    }

    async fn list_events(
        &self,
        calendar: &Calendar,
        credential: &Credential,
        window: FetchWindow,
    ) -> Result<EventPage> {
        let url = format!("{}/calendars/{}/events", self.api_base, calendar.platform_id);

        let mut events = Vec::new();
        let mut sync_token: Option<String> = None;
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("singleEvents", "true".to_string()),
                ("showDeleted", "false".to_string()),
                ("orderBy", "startTime".to_string()),
                ("timeMin", window.time_min.to_rfc3339()),
                ("timeMax", window.time_max.to_rfc3339()),
                ("timeZone", "UTC".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .send_with_retry(|| {
                    self.client.get(&url).bearer_auth(&credential.access_token).query(&params)
                })
                .await?;
            let payload: GoogleEventsResponse =
                Self::parse_success(response, "list events").await?;

            events.extend(payload.items.into_iter().map(into_provider_event));
            sync_token = payload.next_sync_token.or(sync_token);
            page_token = payload.next_page_token;

            if page_token.is_none() {
                break;
            }
            debug!(calendar_id = %calendar.id, fetched = events.len(), "following event page");
        }

        Ok(EventPage { events, sync_token })
    }

    async fn get_series(
        &self,
        calendar: &Calendar,
        credential: &Credential,
        series_id: &str,
    ) -> Result<ProviderEvent> {
        let url =
            format!("{}/calendars/{}/events/{}", self.api_base, calendar.platform_id, series_id);
        let response = self
            .send_with_retry(|| self.client.get(&url).bearer_auth(&credential.access_token))
            .await?;
        let payload: GoogleCalendarEvent = Self::parse_success(response, "get series").await?;

        Ok(into_provider_event(payload))
    }

    async fn watch(
        &self,
        calendar: &Calendar,
        credential: &Credential,
        webhook_url: &str,
        client_state: &str,
    ) -> Result<SyncSubscription> {
        let url = format!("{}/calendars/{}/events/watch", self.api_base, calendar.platform_id);
        let channel_id = Uuid::new_v4().to_string();
        let body = json!({
            "id": channel_id,
            "type": "web_hook",
            "address": webhook_url,
            "token": client_state,
        });

        let response = self
            .send_with_retry(|| {
                self.client.post(&url).bearer_auth(&credential.access_token).json(&body)
            })
            .await?;
        let payload: GoogleChannelResponse =
            Self::parse_success(response, "watch calendar").await?;

        Ok(SyncSubscription {
            subscription_id: payload.id,
            resource_id: payload.resource_id,
            expiration: parse_channel_expiration(&payload.expiration)?,
            provider: calendar.provider.clone(),
            client_state: client_state.to_string(),
            sync_token: None,
            webhook_url: webhook_url.to_string(),
        })
    }

    async fn stop(&self, credential: &Credential, subscription: &SyncSubscription) -> Result<()> {
        let url = format!("{}/channels/stop", self.api_base);
        let body = json!({
            "id": subscription.subscription_id,
            "resourceId": subscription.resource_id,
        });

        let response = self
            .send_with_retry(|| {
                self.client.post(&url).bearer_auth(&credential.access_token).json(&body)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &body, "stop channel"));
        }
        Ok(())
    }
}

fn map_status(status: StatusCode, body: &str, context: &str) -> DaylineError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DaylineError::TokenExpired(format!(
            "provider rejected credentials during {context} ({status}): {body}"
        )),
        StatusCode::NOT_FOUND => DaylineError::NotFound(format!("{context}: {body}")),
        StatusCode::GONE => {
            DaylineError::InvalidInput(format!("{context} rejected as stale ({status}): {body}"))
        }
        _ => DaylineError::Provider(format!("{context} failed ({status}): {body}")),
    }
}

/// Channel expirations arrive as epoch milliseconds, usually stringified.
fn parse_channel_expiration(raw: &Value) -> Result<DateTime<Utc>> {
    let millis = match raw {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse::<i64>().ok(),
        _ => None,
    };

    millis
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| {
            DaylineError::InvalidInput(format!("unparseable channel expiration: {raw}"))
        })
}

fn into_provider_event(event: GoogleCalendarEvent) -> ProviderEvent {
    let GoogleCalendarEvent {
        id,
        summary,
        status,
        start,
        end,
        recurrence,
        recurring_event_id,
        i_cal_uid,
        original_start_time,
    } = event;

    ProviderEvent {
        id,
        summary,
        status,
        start: start.map(EventDateTime::into_value).unwrap_or(Value::Null),
        end: end.map(EventDateTime::into_value).unwrap_or(Value::Null),
        recurrence: recurrence.unwrap_or_default(),
        series_master_id: recurring_event_id,
        ical_uid: i_cal_uid,
        original_start_time: original_start_time.and_then(EventDateTime::into_raw),
    }
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarListItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListItem {
    id: String,
    summary: Option<String>,
    primary: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    summary: Option<String>,
    status: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    recurrence: Option<Vec<String>>,
    #[serde(rename = "recurringEventId")]
    recurring_event_id: Option<String>,
    #[serde(rename = "iCalUID")]
    i_cal_uid: Option<String>,
    #[serde(rename = "originalStartTime")]
    original_start_time: Option<EventDateTime>,
}

#[derive(Debug, Deserialize)]
struct EventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl EventDateTime {
    fn into_value(self) -> Value {
        match self.date_time.or(self.date) {
            Some(raw) => Value::String(raw),
            None => Value::Null,
        }
    }

    fn into_raw(self) -> Option<String> {
        self.date_time.or(self.date)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleChannelResponse {
    id: String,
    #[serde(rename = "resourceId")]
    resource_id: String,
    #[serde(default)]
    expiration: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_expiration_accepts_string_and_number_millis() {
        let from_string = parse_channel_expiration(&json!("1735689600000")).unwrap();
        let from_number = parse_channel_expiration(&json!(1735689600000i64)).unwrap();
        assert_eq!(from_string, from_number);
        assert!(parse_channel_expiration(&Value::Null).is_err());
        assert!(parse_channel_expiration(&json!("soon")).is_err());
    }

    #[test]
    fn event_datetime_prefers_datetime_over_date() {
        let both = EventDateTime {
            date_time: Some("2026-02-04T08:00:00Z".into()),
            date: Some("2026-02-04".into()),
        };
        assert_eq!(both.into_value(), Value::String("2026-02-04T08:00:00Z".into()));

        let date_only = EventDateTime { date_time: None, date: Some("2026-02-04".into()) };
        assert_eq!(date_only.into_value(), Value::String("2026-02-04".into()));

        let neither = EventDateTime { date_time: None, date: None };
        assert_eq!(neither.into_value(), Value::Null);
    }
}
