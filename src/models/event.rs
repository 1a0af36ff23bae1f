use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::clients::calendar_client::ProviderEvent;
use crate::timezone::TimezoneManager;

/// An event as the assistant works with it: times projected into the
/// user's zone, attendees flattened to email strings.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub location: String,
    pub attendees: Vec<String>,
    pub status: String,
    pub html_link: String,
}

impl CalendarEvent {
    /// Projects a provider event into the user zone. Returns None for
    /// entries without an id or resolvable start/end.
    pub fn from_provider(event: &ProviderEvent, tz: &TimezoneManager) -> Option<Self> {
        let id = event.id.clone()?;
        let start = event.start.as_ref()?.resolve().ok()?;
        let end = event.end.as_ref()?.resolve().ok()?;
        Some(Self {
            id,
            summary: event
                .summary
                .clone()
                .unwrap_or_else(|| "No title".to_string()),
            description: event.description.clone().unwrap_or_default(),
            start: tz.to_user_tz(start),
            end: tz.to_user_tz(end),
            location: event.location.clone().unwrap_or_default(),
            attendees: event
                .attendees
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|a| a.email.clone())
                .collect(),
            status: event
                .status
                .clone()
                .unwrap_or_else(|| "confirmed".to_string()),
            html_link: event.html_link.clone().unwrap_or_default(),
        })
    }
}

/// Transient overlap-test projection. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
}

/// Uniform result shape for provider mutations.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub event_id: Option<String>,
    pub summary: Option<String>,
    pub message: String,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok(event_id: Option<String>, summary: Option<String>, message: String) -> Self {
        Self {
            success: true,
            event_id,
            summary,
            message,
            error: None,
        }
    }

    pub fn failed(message: String, error: String) -> Self {
        Self {
            success: false,
            event_id: None,
            summary: None,
            message,
            error: Some(error),
        }
    }
}

/// Wire shape for event lists in API replies and CLI listings.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: String,
    pub summary: String,
    pub start: String,
    pub end: String,
    pub location: String,
}

impl From<&CalendarEvent> for EventSummary {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            id: event.id.clone(),
            summary: event.summary.clone(),
            start: event.start.to_rfc3339(),
            end: event.end.to_rfc3339(),
            location: event.location.clone(),
        }
    }
}
