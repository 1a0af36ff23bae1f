//! Extraction of structured action payloads from free text. The model
//! returns raw JSON; a malformed or empty reply becomes a typed
//! `ParseError` that callers must treat as "could not understand",
//! never as a no-op success.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::clients::groq_client::{LlmTask, strip_code_fences};
use crate::constants;
use crate::models::event::{CalendarEvent, Conflict};
use crate::service::llm_service::LlmClient;
use crate::timezone::TimezoneManager;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty response from language model")]
    EmptyResponse,
    #[error("invalid JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("completion failed: {0}")]
    Completion(String),
}

/// Create payload. Start and end are both required downstream; the prompt
/// instructs the model itself to default a missing end to start + 1 hour,
/// so an absent bound here is a hard extraction failure, not something to
/// patch up locally.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

/// Modify payload. JSON `null` (or an absent key) means "leave the field
/// alone"; an empty string is an explicit clear. The two are never
/// conflated.
#[derive(Debug, Clone, Deserialize)]
pub struct ModifyRequest {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub event_id: Option<String>,
}

/// The event being proposed when reporting a conflict.
#[derive(Debug, Clone)]
pub struct ProposedEvent {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

pub struct ActionParser {
    llm: Arc<dyn LlmClient>,
}

impl ActionParser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn parse_create(
        &self,
        utterance: &str,
        current_date: &str,
    ) -> Result<CreateRequest, ParseError> {
        let prompt = format!(
            "Extract event details from this query to create a calendar event.\n\n\
             Current date: {current_date}\n\n\
             User query: \"{utterance}\"\n\n\
             Return a JSON object with:\n\
             - summary: Event title/name\n\
             - start_time: Start time in format \"YYYY-MM-DD HH:MM\" (24-hour format). Use the CURRENT DATE or calculate relative dates (today, tomorrow) based on the current date provided.\n\
             - end_time: End time in format \"YYYY-MM-DD HH:MM\" (24-hour format, default to 1 hour after start_time if not specified)\n\
             - description: Event description (optional, empty string if not provided)\n\
             - location: Event location (optional, empty string if not provided)\n\
             - attendees: List of email addresses (optional, empty list if not provided)\n\n\
             IMPORTANT:\n\
             - Always use the current date provided to calculate relative dates like \"tomorrow\"\n\
             - Always provide both start_time and end_time. If end_time is not specified, default to 1 hour after start_time.\n\
             - Return ONLY valid JSON."
        );
        self.request(LlmTask::ParseCreate, &prompt).await
    }

    pub async fn parse_modify(
        &self,
        utterance: &str,
        events: &[CalendarEvent],
    ) -> Result<ModifyRequest, ParseError> {
        let prompt = format!(
            "Extract modification details from this query.\n\n\
             Available events:\n{events}\n\
             User query: \"{utterance}\"\n\n\
             Return a JSON object with:\n\
             - event_id: ID of event to modify (from available events or user description)\n\
             - summary: New title (optional, null if not changing)\n\
             - start_time: New start time in format \"YYYY-MM-DD HH:MM\" (optional, null if not changing)\n\
             - end_time: New end time in format \"YYYY-MM-DD HH:MM\" (optional, null if not changing)\n\
             - description: New description (optional, null if not changing)\n\
             - location: New location (optional, null if not changing)\n\
             - attendees: New list of emails (optional, null if not changing)\n\n\
             Return ONLY valid JSON.",
            events = format_known_events(events),
        );
        self.request(LlmTask::ParseModify, &prompt).await
    }

    pub async fn parse_cancel(
        &self,
        utterance: &str,
        events: &[CalendarEvent],
    ) -> Result<CancelRequest, ParseError> {
        let prompt = format!(
            "Extract event to cancel from this query.\n\n\
             Available events:\n{events}\n\
             User query: \"{utterance}\"\n\n\
             Return a JSON object with:\n\
             - event_id: ID of event to cancel (from available events or user description)\n\n\
             Return ONLY valid JSON.",
            events = format_known_events(events),
        );
        self.request(LlmTask::ParseCancel, &prompt).await
    }

    /// Conversational conflict notice. Falls back to a fixed sentence when
    /// the model is unavailable; a conflict refusal never turns into an
    /// error surface.
    pub async fn conflict_message(
        &self,
        utterance: &str,
        proposed: &ProposedEvent,
        conflicts: &[Conflict],
        tz: &TimezoneManager,
    ) -> String {
        let mut conflicts_text = String::new();
        for conflict in conflicts {
            conflicts_text.push_str(&format!(
                "- {} from {} to {}\n",
                conflict.summary,
                tz.to_user_tz(conflict.start).format("%Y-%m-%d %I:%M %p"),
                tz.to_user_tz(conflict.end).format("%I:%M %p"),
            ));
        }

        let prompt = format!(
            "User requested: \"{utterance}\"\n\n\
             Proposed event: {summary} from {start} to {end}\n\n\
             Conflicting events:\n{conflicts_text}\n\
             Generate a friendly, conversational message informing the user about the scheduling conflict. Be concise and helpful.",
            summary = proposed.summary,
            start = proposed.start.format("%Y-%m-%d %I:%M %p"),
            end = proposed.end.format("%Y-%m-%d %I:%M %p"),
        );

        match self.llm.complete(LlmTask::ConflictNotice, &prompt).await {
            Ok(message) => message.trim().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "conflict message generation failed");
                "I found a scheduling conflict. You already have an event at that time."
                    .to_string()
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        task: LlmTask,
        prompt: &str,
    ) -> Result<T, ParseError> {
        let raw = self
            .llm
            .complete(task, prompt)
            .await
            .map_err(|e| ParseError::Completion(e.to_string()))?;
        decode(&raw)
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let content = strip_code_fences(raw);
    if content.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    Ok(serde_json::from_str(&content)?)
}

/// Short human-readable lines the model uses to pick an event id. Bounded
/// to the most recent window.
pub fn format_known_events(events: &[CalendarEvent]) -> String {
    if events.is_empty() {
        return "No events found.\n".to_string();
    }
    events
        .iter()
        .take(constants::MAX_EVENTS_FOR_PARSER)
        .map(|event| {
            format!(
                "- {}: {} on {}\n",
                event.id,
                event.summary,
                event.start.format("%Y-%m-%d %I:%M %p")
            )
        })
        .collect()
}

/// Parses the extractor's `YYYY-MM-DD HH:MM` wall-clock format into a
/// user-zone instant.
pub fn parse_event_time(
    raw: &str,
    tz: &TimezoneManager,
) -> Result<DateTime<Tz>, chrono::ParseError> {
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")?;
    Ok(tz.localize(naive))
}
