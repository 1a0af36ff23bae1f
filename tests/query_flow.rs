use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use calendarBot::cache::EventCache;
use calendarBot::clients::calendar_client::{
    CalendarApi, EventTime, ProviderError, ProviderEvent,
};
use calendarBot::clients::groq_client::LlmTask;
use calendarBot::models::event::CalendarEvent;
use calendarBot::orchestrator::Orchestrator;
use calendarBot::service::intent::Intent;
use calendarBot::service::llm_service::LlmClient;
use calendarBot::timezone::TimezoneManager;

struct ScriptedLlm {
    responses: HashMap<LlmTask, Result<String, String>>,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    fn ok(mut self, task: LlmTask, body: &str) -> Self {
        self.responses.insert(task, Ok(body.to_string()));
        self
    }

    fn err(mut self, task: LlmTask, message: &str) -> Self {
        self.responses.insert(task, Err(message.to_string()));
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        task: LlmTask,
        _prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        match self.responses.get(&task) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(err)) => Err(err.clone().into()),
            None => Err(format!("no scripted response for {task:?}").into()),
        }
    }
}

struct FakeCalendar {
    events: StdMutex<Vec<ProviderEvent>>,
}

impl FakeCalendar {
    fn with_events(events: Vec<ProviderEvent>) -> Self {
        Self {
            events: StdMutex::new(events),
        }
    }

    fn event(id: &str, summary: &str, start: &str, end: &str) -> ProviderEvent {
        ProviderEvent {
            id: Some(id.to_string()),
            summary: Some(summary.to_string()),
            start: Some(EventTime {
                date_time: Some(start.to_string()),
                date: None,
                time_zone: None,
            }),
            end: Some(EventTime {
                date_time: Some(end.to_string()),
                date: None,
                time_zone: None,
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn list_events(
        &self,
        _time_min: chrono::DateTime<Utc>,
        _time_max: Option<chrono::DateTime<Utc>>,
        _max_results: Option<u32>,
    ) -> Result<Vec<ProviderEvent>, ProviderError> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn get_event(&self, _event_id: &str) -> Result<ProviderEvent, ProviderError> {
        Err(ProviderError::Api {
            status: 404,
            body: "not found".to_string(),
        })
    }

    async fn insert_event(&self, _event: &ProviderEvent) -> Result<ProviderEvent, ProviderError> {
        unreachable!("query turns never insert");
    }

    async fn update_event(
        &self,
        _event_id: &str,
        _event: &ProviderEvent,
    ) -> Result<ProviderEvent, ProviderError> {
        unreachable!("query turns never update");
    }

    async fn delete_event(&self, _event_id: &str) -> Result<(), ProviderError> {
        unreachable!("query turns never delete");
    }

    async fn calendar_timezone(&self) -> Result<String, ProviderError> {
        Ok("UTC".to_string())
    }
}

fn build_orchestrator(
    llm: ScriptedLlm,
    calendar: Arc<FakeCalendar>,
) -> (tempfile::TempDir, Orchestrator) {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::new(llm),
        calendar,
        TimezoneManager::default(),
        dir.path().join("events.db"),
    )
    .unwrap();
    (dir, orchestrator)
}

fn cached_event(id: &str, summary: &str, start_utc: (u32, u32)) -> CalendarEvent {
    let tz = TimezoneManager::default();
    let (hour, minute) = start_utc;
    CalendarEvent {
        id: id.to_string(),
        summary: summary.to_string(),
        description: String::new(),
        start: tz.to_user_tz(Utc.with_ymd_and_hms(2024, 3, 11, hour, minute, 0).unwrap()),
        end: tz.to_user_tz(Utc.with_ymd_and_hms(2024, 3, 11, hour + 1, minute, 0).unwrap()),
        location: String::new(),
        attendees: Vec::new(),
        status: "confirmed".to_string(),
        html_link: String::new(),
    }
}

#[tokio::test]
async fn translated_sql_runs_against_the_cache() {
    let llm = ScriptedLlm::new()
        .ok(LlmTask::Intent, "query")
        .ok(
            LlmTask::SqlQuery,
            "```sql\nSELECT * FROM events ORDER BY start_time\n```",
        )
        .ok(LlmTask::Response, "You have a standup at nine.");
    let calendar = Arc::new(FakeCalendar::with_events(vec![FakeCalendar::event(
        "evt1",
        "Standup",
        "2024-03-11T09:00:00Z",
        "2024-03-11T09:15:00Z",
    )]));
    let (_dir, orchestrator) = build_orchestrator(llm, calendar);

    orchestrator.resync().await;
    let turn = orchestrator.handle_turn("what's on my calendar?").await;

    assert_eq!(turn.intent, Intent::Query);
    assert!(turn.success);
    assert_eq!(turn.response, "You have a standup at nine.");
    assert_eq!(turn.events.len(), 1);
    assert_eq!(turn.events[0].id, "evt1");
}

#[tokio::test]
async fn utc_rows_bucket_into_the_users_civil_day() {
    // 2024-03-11 03:00 UTC is 22:00 the previous evening at UTC-5, so an
    // "events today" query shifted by '-5 hours' must file it under
    // 2024-03-10.
    let dir = tempfile::tempdir().unwrap();
    let cache = EventCache::new(dir.path().join("events.db"), TimezoneManager::default()).unwrap();
    cache.store_events(&[cached_event("late1", "Late call", (3, 0))]);

    let previous_day = cache.query(
        "SELECT * FROM events WHERE date(datetime(start_time, '-5 hours')) = '2024-03-10'",
    );
    assert_eq!(previous_day.len(), 1);
    assert_eq!(previous_day[0].id, "late1");

    let same_day = cache.query(
        "SELECT * FROM events WHERE date(datetime(start_time, '-5 hours')) = '2024-03-11'",
    );
    assert!(same_day.is_empty());
}

#[tokio::test]
async fn translation_failure_answers_from_live_events_not_the_cache() {
    let llm = ScriptedLlm::new()
        .ok(LlmTask::Intent, "query")
        .err(LlmTask::SqlQuery, "model offline")
        .ok(LlmTask::Answer, "Your only upcoming event is the standup.");
    let calendar = Arc::new(FakeCalendar::with_events(vec![FakeCalendar::event(
        "evt1",
        "Standup",
        "2024-03-11T09:00:00Z",
        "2024-03-11T09:15:00Z",
    )]));
    let (_dir, orchestrator) = build_orchestrator(llm, calendar);

    // Leave stale extra rows in the cache: the fallback must ignore them.
    orchestrator.cache().store_events(&[
        cached_event("stale1", "Old meeting", (10, 0)),
        cached_event("stale2", "Older meeting", (12, 0)),
    ]);

    let turn = orchestrator.handle_turn("anything coming up?").await;
    assert!(turn.success);
    assert_eq!(turn.response, "Your only upcoming event is the standup.");
    assert_eq!(turn.events.len(), 1);
    assert_eq!(turn.events[0].id, "evt1");
}

#[tokio::test]
async fn translation_failure_without_live_events_lists_the_cache() {
    let llm = ScriptedLlm::new()
        .ok(LlmTask::Intent, "query")
        .err(LlmTask::SqlQuery, "model offline")
        .err(LlmTask::Response, "model offline");
    let calendar = Arc::new(FakeCalendar::with_events(Vec::new()));
    let (_dir, orchestrator) = build_orchestrator(llm, calendar);

    orchestrator.cache().store_events(&[
        cached_event("e1", "Meeting", (10, 0)),
        cached_event("e2", "Review", (12, 0)),
    ]);

    let turn = orchestrator.handle_turn("show all events").await;
    assert!(turn.success);
    // Responder is down too, so the templated count fallback answers.
    assert_eq!(turn.response, "Found 2 event(s) matching your query.");
    assert_eq!(turn.events.len(), 2);
}
