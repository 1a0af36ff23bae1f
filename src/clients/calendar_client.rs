//! Calendar provider access. The REST shapes follow the Google Calendar
//! v3 API; everything above this module talks to the `CalendarApi` trait
//! so tests can substitute an in-memory provider.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("calendar request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("calendar API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("{0}")]
    InvalidEvent(String),
}

/// Event boundary as the provider sends it: a `dateTime` for timed events
/// or a bare `date` for all-day events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn utc(instant: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
            date: None,
            time_zone: Some("UTC".to_string()),
        }
    }

    /// All-day dates resolve to midnight UTC.
    pub fn resolve(&self) -> Result<DateTime<Utc>, ProviderError> {
        if let Some(raw) = &self.date_time {
            return DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ProviderError::InvalidEvent(format!("bad dateTime '{raw}': {e}")));
        }
        if let Some(raw) = &self.date {
            let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| ProviderError::InvalidEvent(format!("bad date '{raw}': {e}")))?;
            let midnight = day
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| ProviderError::InvalidEvent(format!("bad date '{raw}'")))?;
            return Ok(Utc.from_utc_datetime(&midnight));
        }
        Err(ProviderError::InvalidEvent(
            "event boundary has neither dateTime nor date".to_string(),
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: String,
}

/// Provider event resource. Fields this assistant never touches ride
/// along in `extra` so a read-merge-update cycle does not drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<EventAttendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "htmlLink", skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<ProviderEvent>,
}

#[derive(Debug, Deserialize)]
struct CalendarMetadata {
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
        max_results: Option<u32>,
    ) -> Result<Vec<ProviderEvent>, ProviderError>;

    async fn get_event(&self, event_id: &str) -> Result<ProviderEvent, ProviderError>;

    async fn insert_event(&self, event: &ProviderEvent) -> Result<ProviderEvent, ProviderError>;

    async fn update_event(
        &self,
        event_id: &str,
        event: &ProviderEvent,
    ) -> Result<ProviderEvent, ProviderError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), ProviderError>;

    async fn calendar_timezone(&self) -> Result<String, ProviderError>;
}

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: String,
    calendar_id: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(constants::CALENDAR_API_BASE.to_string(), access_token)
    }

    pub fn with_base_url(base_url: String, access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            calendar_id: constants::CALENDAR_ID.to_string(),
            access_token,
        }
    }

    fn calendar_url(&self) -> String {
        format!("{}/calendars/{}", self.base_url, self.calendar_id)
    }

    fn events_url(&self) -> String {
        format!("{}/events", self.calendar_url())
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), event_id)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidEvent(format!("unreadable provider response: {e}")))
    }
}

fn rfc3339_z(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
        max_results: Option<u32>,
    ) -> Result<Vec<ProviderEvent>, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![
            ("timeMin", rfc3339_z(time_min)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(max) = time_max {
            query.push(("timeMax", rfc3339_z(max)));
        }
        if let Some(count) = max_results {
            query.push(("maxResults", count.to_string()));
        }

        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await?;
        let list: EventList = self.read_json(response).await?;
        Ok(list.items)
    }

    async fn get_event(&self, event_id: &str) -> Result<ProviderEvent, ProviderError> {
        let response = self
            .http
            .get(self.event_url(event_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        self.read_json(response).await
    }

    async fn insert_event(&self, event: &ProviderEvent) -> Result<ProviderEvent, ProviderError> {
        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await?;
        self.read_json(response).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        event: &ProviderEvent,
    ) -> Result<ProviderEvent, ProviderError> {
        let response = self
            .http
            .put(self.event_url(event_id))
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await?;
        self.read_json(response).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .delete(self.event_url(event_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn calendar_timezone(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(self.calendar_url())
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let metadata: CalendarMetadata = self.read_json(response).await?;
        Ok(metadata.time_zone.unwrap_or_else(|| "UTC".to_string()))
    }
}
