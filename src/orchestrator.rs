//! The per-turn pipeline: classify → extract → conflict-check → mutate →
//! resync → validate → respond, or the query path through the translator
//! and cache. Each utterance is processed synchronously end to end; the
//! provider stays the source of truth and the cache is rebuilt wholesale
//! after every successful mutation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::EventCache;
use crate::clients::calendar_client::CalendarApi;
use crate::constants;
use crate::models::event::{ActionOutcome, CalendarEvent, EventSummary};
use crate::service::conflicts::ConflictDetector;
use crate::service::intent::{Intent, IntentClassifier};
use crate::service::llm_service::LlmClient;
use crate::service::mutator::{CalendarMutator, ModifyChanges, infer_end_from_duration};
use crate::service::parser::{ActionParser, ProposedEvent, parse_event_time};
use crate::service::responder::ResponseService;
use crate::service::sql::SqlGenerator;
use crate::service::validator::ValidationService;
use crate::timezone::TimezoneManager;

#[derive(Debug)]
pub struct TurnResult {
    pub intent: Intent,
    pub success: bool,
    pub response: String,
    pub events: Vec<EventSummary>,
}

fn summaries(events: &[CalendarEvent]) -> Vec<EventSummary> {
    events.iter().map(EventSummary::from).collect()
}

fn fail(intent: Intent, response: String) -> TurnResult {
    TurnResult {
        intent,
        success: false,
        response,
        events: Vec::new(),
    }
}

pub struct Orchestrator {
    tz: TimezoneManager,
    calendar: Arc<dyn CalendarApi>,
    cache: EventCache,
    intents: IntentClassifier,
    parser: ActionParser,
    conflicts: ConflictDetector,
    mutator: CalendarMutator,
    sql: SqlGenerator,
    responder: ResponseService,
    validator: ValidationService,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        calendar: Arc<dyn CalendarApi>,
        tz: TimezoneManager,
        db_path: impl Into<PathBuf>,
    ) -> rusqlite::Result<Self> {
        let cache = EventCache::new(db_path, tz)?;
        Ok(Self {
            tz,
            intents: IntentClassifier::new(llm.clone()),
            parser: ActionParser::new(llm.clone()),
            conflicts: ConflictDetector::new(calendar.clone()),
            mutator: CalendarMutator::new(calendar.clone()),
            sql: SqlGenerator::new(llm.clone()),
            responder: ResponseService::new(llm.clone()),
            validator: ValidationService::new(llm),
            calendar,
            cache,
        })
    }

    pub fn cache(&self) -> &EventCache {
        &self.cache
    }

    /// Upcoming events straight from the provider, projected into the
    /// user zone. Empty on provider failure.
    pub async fn fetch_live_events(&self) -> Vec<CalendarEvent> {
        match self
            .calendar
            .list_events(Utc::now(), None, Some(constants::NUM_RECENT_EVENTS))
            .await
        {
            Ok(items) => items
                .iter()
                .filter_map(|event| CalendarEvent::from_provider(event, &self.tz))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "could not fetch provider events");
                Vec::new()
            }
        }
    }

    /// Full delete-and-reload cache refresh. Returns the number of rows
    /// stored.
    pub async fn resync(&self) -> usize {
        self.cache.clear();
        let events = self.fetch_live_events().await;
        let stored = self.cache.store_events(&events);
        tracing::info!(stored, "cache resynced from provider");
        stored
    }

    pub async fn handle_turn(&self, utterance: &str) -> TurnResult {
        let intent = self.intents.classify(utterance).await;
        tracing::debug!(intent = intent.as_str(), utterance, "classified turn");
        match intent {
            Intent::Quit => TurnResult {
                intent,
                success: true,
                response: "Goodbye!".to_string(),
                events: Vec::new(),
            },
            Intent::Query => self.handle_query(utterance).await,
            Intent::Create => self.handle_create(utterance).await,
            Intent::Modify => self.handle_modify(utterance).await,
            Intent::Cancel => self.handle_cancel(utterance).await,
        }
    }

    async fn handle_query(&self, utterance: &str) -> TurnResult {
        let live = self.fetch_live_events().await;
        let schema = self.cache.schema_description();

        match self.sql.text_to_sql(utterance, &schema, &self.tz).await {
            Ok(sql) => {
                tracing::debug!(sql, "running translated query");
                let events = self.cache.query(&sql);
                let response = self.responder.respond(utterance, &events).await;
                TurnResult {
                    intent: Intent::Query,
                    success: true,
                    response,
                    events: summaries(&events),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "query translation failed, using fallback");
                if !live.is_empty() {
                    // Fallback answers from the live provider list; the
                    // cache is not consulted on this path.
                    let response = self.responder.answer(utterance, &live).await;
                    TurnResult {
                        intent: Intent::Query,
                        success: true,
                        response,
                        events: summaries(&live),
                    }
                } else {
                    let events = self.cache.query(constants::DEFAULT_EVENTS_SQL);
                    let response = self.responder.respond(utterance, &events).await;
                    TurnResult {
                        intent: Intent::Query,
                        success: true,
                        response,
                        events: summaries(&events),
                    }
                }
            }
        }
    }

    async fn handle_create(&self, utterance: &str) -> TurnResult {
        let current_date = self.tz.now_in_user_tz().format("%Y-%m-%d").to_string();
        let params = match self.parser.parse_create(utterance, &current_date).await {
            Ok(params) => params,
            Err(err) => return fail(Intent::Create, format!("Error parsing request: {err}")),
        };

        // Both bounds are mandatory; the model owns the one-hour default.
        let (Some(start_raw), Some(end_raw)) =
            (params.start_time.as_deref(), params.end_time.as_deref())
        else {
            return fail(
                Intent::Create,
                "Error: Missing required start or end time.".to_string(),
            );
        };
        let start = match parse_event_time(start_raw, &self.tz) {
            Ok(dt) => dt,
            Err(err) => {
                return fail(
                    Intent::Create,
                    format!("Error parsing request: bad start time '{start_raw}': {err}"),
                );
            }
        };
        let end = match parse_event_time(end_raw, &self.tz) {
            Ok(dt) => dt,
            Err(err) => {
                return fail(
                    Intent::Create,
                    format!("Error parsing request: bad end time '{end_raw}': {err}"),
                );
            }
        };
        if start >= end {
            return fail(
                Intent::Create,
                "The event's end time must be after its start time.".to_string(),
            );
        }

        let summary = params
            .summary
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Event".to_string());

        let conflicts = self.conflicts.find_conflicts(start, end, None).await;
        if !conflicts.is_empty() {
            let proposed = ProposedEvent {
                summary,
                start,
                end,
            };
            let response = self
                .parser
                .conflict_message(utterance, &proposed, &conflicts, &self.tz)
                .await;
            return TurnResult {
                intent: Intent::Create,
                success: true,
                response,
                events: Vec::new(),
            };
        }

        let outcome = self
            .mutator
            .create_event(
                &summary,
                start,
                end,
                params.description.as_deref().unwrap_or(""),
                params.location.as_deref().unwrap_or(""),
                params.attendees.as_deref().unwrap_or(&[]),
            )
            .await;
        self.finish_mutation(utterance, Intent::Create, outcome).await
    }

    async fn handle_modify(&self, utterance: &str) -> TurnResult {
        let known = self.fetch_live_events().await;
        let params = match self.parser.parse_modify(utterance, &known).await {
            Ok(params) => params,
            Err(err) => return fail(Intent::Modify, format!("Error parsing request: {err}")),
        };
        let Some(event_id) = params.event_id.clone().filter(|id| !id.is_empty()) else {
            return fail(
                Intent::Modify,
                "Could not identify which event to modify.".to_string(),
            );
        };

        let start = match params.start_time.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match parse_event_time(raw, &self.tz) {
                Ok(dt) => Some(dt),
                Err(err) => {
                    return fail(
                        Intent::Modify,
                        format!("Error parsing request: bad start time '{raw}': {err}"),
                    );
                }
            },
            None => None,
        };
        let end = match params.end_time.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match parse_event_time(raw, &self.tz) {
                Ok(dt) => Some(dt),
                Err(err) => {
                    return fail(
                        Intent::Modify,
                        format!("Error parsing request: bad end time '{raw}': {err}"),
                    );
                }
            },
            None => None,
        };

        if let Some(start) = start {
            // Complete the range for the conflict check: an explicit end
            // wins, otherwise the original duration carries over. When the
            // original cannot be read the check is skipped entirely.
            let mut end_for_check = end;
            if end_for_check.is_none() {
                if let Ok(original) = self.calendar.get_event(&event_id).await {
                    let resolved = original
                        .start
                        .as_ref()
                        .and_then(|t| t.resolve().ok())
                        .zip(original.end.as_ref().and_then(|t| t.resolve().ok()));
                    if let Some((original_start, original_end)) = resolved {
                        let inferred = infer_end_from_duration(
                            start.with_timezone(&Utc),
                            original_start,
                            original_end,
                        );
                        end_for_check = Some(self.tz.to_user_tz(inferred));
                    }
                }
            }

            if let Some(end_for_check) = end_for_check {
                if start >= end_for_check {
                    return fail(
                        Intent::Modify,
                        "The event's end time must be after its start time.".to_string(),
                    );
                }
                let conflicts = self
                    .conflicts
                    .find_conflicts(start, end_for_check, Some(&event_id))
                    .await;
                if !conflicts.is_empty() {
                    let proposed = ProposedEvent {
                        summary: params
                            .summary
                            .clone()
                            .filter(|s| !s.is_empty())
                            .unwrap_or_else(|| "Event".to_string()),
                        start,
                        end: end_for_check,
                    };
                    let response = self
                        .parser
                        .conflict_message(utterance, &proposed, &conflicts, &self.tz)
                        .await;
                    return TurnResult {
                        intent: Intent::Modify,
                        success: true,
                        response,
                        events: Vec::new(),
                    };
                }
            }
        }

        let outcome = self
            .mutator
            .modify_event(
                &event_id,
                ModifyChanges {
                    summary: params.summary.clone(),
                    start,
                    end,
                    description: params.description.clone(),
                    location: params.location.clone(),
                    attendees: params.attendees.clone(),
                },
            )
            .await;
        self.finish_mutation(utterance, Intent::Modify, outcome).await
    }

    async fn handle_cancel(&self, utterance: &str) -> TurnResult {
        let known = self.fetch_live_events().await;
        let params = match self.parser.parse_cancel(utterance, &known).await {
            Ok(params) => params,
            Err(err) => return fail(Intent::Cancel, format!("Error parsing request: {err}")),
        };
        let Some(event_id) = params.event_id.clone().filter(|id| !id.is_empty()) else {
            return fail(
                Intent::Cancel,
                "Could not identify which event to cancel.".to_string(),
            );
        };

        let outcome = self.mutator.cancel_event(&event_id).await;
        self.finish_mutation(utterance, Intent::Cancel, outcome).await
    }

    /// Shared mutation tail: refresh the cache, sanity-check the stored
    /// result against the request, and assemble the reply. A validation
    /// mismatch is reported instead of the success message but the
    /// mutation is NOT rolled back.
    async fn finish_mutation(
        &self,
        utterance: &str,
        intent: Intent,
        outcome: ActionOutcome,
    ) -> TurnResult {
        if !outcome.success {
            if let Some(error) = &outcome.error {
                tracing::warn!(error, intent = intent.as_str(), "mutation failed");
            }
            return fail(intent, outcome.message);
        }

        self.resync().await;

        let cached = outcome
            .event_id
            .as_deref()
            .and_then(|id| self.cache.event_by_id(id));
        let validation = self
            .validator
            .validate(utterance, intent.as_str(), cached.as_ref())
            .await;

        let response = if validation.valid {
            outcome.message
        } else {
            let detail = if validation.message.is_empty() {
                "Action did not match user request".to_string()
            } else {
                validation.message
            };
            format!("Validation failed: {detail}")
        };

        let events = summaries(&self.cache.query(constants::DEFAULT_EVENTS_SQL));
        TurnResult {
            intent,
            success: true,
            response,
            events,
        }
    }
}
