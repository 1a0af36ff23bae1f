//! Provider mutations. Each operation is a single round trip (modify
//! reads first to merge unchanged fields); nothing is retried — a
//! provider failure is terminal for the turn and surfaces to the user as
//! a plain message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::clients::calendar_client::{CalendarApi, EventAttendee, EventTime, ProviderEvent};
use crate::models::event::ActionOutcome;

/// Field updates for a modify turn. `None` leaves the provider value
/// untouched; an empty string clears text fields (except summary, which
/// only applies when non-empty — events keep a title).
#[derive(Debug, Clone, Default)]
pub struct ModifyChanges {
    pub summary: Option<String>,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<String>>,
}

/// When only a new start is given, the event keeps its original duration.
pub fn infer_end_from_duration(
    new_start: DateTime<Utc>,
    original_start: DateTime<Utc>,
    original_end: DateTime<Utc>,
) -> DateTime<Utc> {
    new_start + (original_end - original_start)
}

fn merge_into(
    event: &mut ProviderEvent,
    changes: &ModifyChanges,
    start_utc: Option<DateTime<Utc>>,
    end_utc: Option<DateTime<Utc>>,
) {
    if let Some(summary) = changes.summary.as_ref().filter(|s| !s.is_empty()) {
        event.summary = Some(summary.clone());
    }
    if let Some(description) = &changes.description {
        event.description = Some(description.clone());
    }
    if let Some(location) = &changes.location {
        event.location = Some(location.clone());
    }
    if let Some(attendees) = &changes.attendees {
        event.attendees = Some(
            attendees
                .iter()
                .map(|email| EventAttendee {
                    email: email.clone(),
                })
                .collect(),
        );
    }
    if let Some(start) = start_utc {
        event.start = Some(EventTime::utc(start));
    }
    if let Some(end) = end_utc {
        event.end = Some(EventTime::utc(end));
    }
}

pub struct CalendarMutator {
    calendar: Arc<dyn CalendarApi>,
}

impl CalendarMutator {
    pub fn new(calendar: Arc<dyn CalendarApi>) -> Self {
        Self { calendar }
    }

    pub async fn create_event(
        &self,
        summary: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        description: &str,
        location: &str,
        attendees: &[String],
    ) -> ActionOutcome {
        let body = ProviderEvent {
            summary: Some(summary.to_string()),
            description: Some(description.to_string()),
            location: Some(location.to_string()),
            start: Some(EventTime::utc(start.with_timezone(&Utc))),
            end: Some(EventTime::utc(end.with_timezone(&Utc))),
            attendees: if attendees.is_empty() {
                None
            } else {
                Some(
                    attendees
                        .iter()
                        .map(|email| EventAttendee {
                            email: email.clone(),
                        })
                        .collect(),
                )
            },
            ..Default::default()
        };

        match self.calendar.insert_event(&body).await {
            Ok(created) if created.id.is_some() => ActionOutcome::ok(
                created.id.clone(),
                created.summary.clone(),
                format!("Event '{summary}' created successfully"),
            ),
            Ok(_) => ActionOutcome::failed(
                "Failed to create event: No event ID returned".to_string(),
                "Event creation returned no event ID".to_string(),
            ),
            Err(err) => ActionOutcome::failed(
                format!("Failed to create event: {err}"),
                err.to_string(),
            ),
        }
    }

    pub async fn modify_event(&self, event_id: &str, changes: ModifyChanges) -> ActionOutcome {
        let mut event = match self.calendar.get_event(event_id).await {
            Ok(event) => event,
            Err(err) => {
                return ActionOutcome::failed(
                    format!("Failed to modify event: {err}"),
                    err.to_string(),
                );
            }
        };

        let start_utc = changes.start.map(|dt| dt.with_timezone(&Utc));
        let mut end_utc = changes.end.map(|dt| dt.with_timezone(&Utc));

        if let (Some(new_start), None) = (start_utc, end_utc) {
            let original = event
                .start
                .as_ref()
                .and_then(|t| t.resolve().ok())
                .zip(event.end.as_ref().and_then(|t| t.resolve().ok()));
            if let Some((original_start, original_end)) = original {
                end_utc = Some(infer_end_from_duration(
                    new_start,
                    original_start,
                    original_end,
                ));
            }
        }

        merge_into(&mut event, &changes, start_utc, end_utc);

        match self.calendar.update_event(event_id, &event).await {
            Ok(updated) => {
                let summary = updated
                    .summary
                    .clone()
                    .unwrap_or_else(|| "Event".to_string());
                ActionOutcome::ok(
                    updated.id.clone(),
                    updated.summary.clone(),
                    format!("Event '{summary}' updated successfully"),
                )
            }
            Err(err) => ActionOutcome::failed(
                format!("Failed to modify event: {err}"),
                err.to_string(),
            ),
        }
    }

    pub async fn cancel_event(&self, event_id: &str) -> ActionOutcome {
        let summary = match self.calendar.get_event(event_id).await {
            Ok(event) => event.summary.unwrap_or_else(|| "Event".to_string()),
            Err(err) => {
                return ActionOutcome::failed(
                    format!("Failed to cancel event: {err}"),
                    err.to_string(),
                );
            }
        };

        match self.calendar.delete_event(event_id).await {
            Ok(()) => ActionOutcome::ok(
                Some(event_id.to_string()),
                Some(summary.clone()),
                format!("Event '{summary}' cancelled successfully"),
            ),
            Err(err) => ActionOutcome::failed(
                format!("Failed to cancel event: {err}"),
                err.to_string(),
            ),
        }
    }
}
