use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::clients::calendar_client::CalendarApi;
use crate::models::event::Conflict;

/// Two ranges conflict iff each extends strictly past the other's
/// boundary. Half-open on both ends: events that merely touch
/// (one ends exactly when the other starts) do NOT conflict.
pub fn ranges_overlap(
    proposed_start: DateTime<Utc>,
    proposed_end: DateTime<Utc>,
    other_start: DateTime<Utc>,
    other_end: DateTime<Utc>,
) -> bool {
    proposed_start < other_end && proposed_end > other_start
}

pub struct ConflictDetector {
    calendar: Arc<dyn CalendarApi>,
}

impl ConflictDetector {
    pub fn new(calendar: Arc<dyn CalendarApi>) -> Self {
        Self { calendar }
    }

    /// Best-effort overlap scan of the provider's events in the proposed
    /// range. `exclude_id` keeps a modification from flagging itself.
    /// Provider errors yield an empty list: this check must never block
    /// the primary action on its own failure.
    pub async fn find_conflicts(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        exclude_id: Option<&str>,
    ) -> Vec<Conflict> {
        let start_utc = start.with_timezone(&Utc);
        let end_utc = end.with_timezone(&Utc);

        let listed = match self.calendar.list_events(start_utc, Some(end_utc), None).await {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(error = %err, "conflict check skipped, provider unavailable");
                return Vec::new();
            }
        };

        let mut conflicts = Vec::new();
        for event in listed {
            let Some(event_id) = event.id.clone() else {
                continue;
            };
            if exclude_id == Some(event_id.as_str()) {
                continue;
            }
            let (Some(event_start), Some(event_end)) = (
                event.start.as_ref().and_then(|t| t.resolve().ok()),
                event.end.as_ref().and_then(|t| t.resolve().ok()),
            ) else {
                continue;
            };

            if ranges_overlap(start_utc, end_utc, event_start, event_end) {
                conflicts.push(Conflict {
                    id: event_id,
                    summary: event
                        .summary
                        .clone()
                        .unwrap_or_else(|| "Untitled Event".to_string()),
                    start: event_start,
                    end: event_end,
                    location: event.location.clone().unwrap_or_default(),
                });
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, hour, minute, 0).unwrap()
    }

    #[test]
    fn overlapping_ranges_conflict() {
        assert!(ranges_overlap(at(9, 0), at(10, 0), at(9, 30), at(10, 30)));
        assert!(ranges_overlap(at(9, 30), at(10, 30), at(9, 0), at(10, 0)));
        // Full containment, both directions.
        assert!(ranges_overlap(at(9, 0), at(12, 0), at(10, 0), at(11, 0)));
        assert!(ranges_overlap(at(10, 0), at(11, 0), at(9, 0), at(12, 0)));
    }

    #[test]
    fn disjoint_ranges_do_not_conflict() {
        assert!(!ranges_overlap(at(9, 0), at(10, 0), at(11, 0), at(12, 0)));
        assert!(!ranges_overlap(at(11, 0), at(12, 0), at(9, 0), at(10, 0)));
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        // The half-open boundary convention is load-bearing: back-to-back
        // meetings are allowed. Do not change to an inclusive comparison.
        assert!(!ranges_overlap(at(9, 0), at(10, 0), at(10, 0), at(11, 0)));
        assert!(!ranges_overlap(at(10, 0), at(11, 0), at(9, 0), at(10, 0)));
    }
}
