//! Hosted surface: a small JSON API over the orchestrator. Sessions are
//! isolated end to end — each gets its own component bundle and its own
//! cache file, registered under a TTL-evicting registry.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use crate::clients::calendar_client::GoogleCalendarClient;
use crate::constants;
use crate::models::event::EventSummary;
use crate::orchestrator::Orchestrator;
use crate::service::llm_service::GroqService;
use crate::session::SessionRegistry;
use crate::timezone::TimezoneManager;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub response: String,
    pub intent: String,
    pub events: Vec<EventSummary>,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    success: bool,
    events: Vec<EventSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorMessage {
    success: bool,
    error: String,
}

fn error_reply(status: StatusCode, error: &str) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&ErrorMessage {
            success: false,
            error: error.to_string(),
        }),
        status,
    )
}

struct ApiContext {
    registry: SessionRegistry<Arc<Orchestrator>>,
    groq_api_key: String,
    calendar_token: String,
    db_dir: String,
    default_timezone: TimezoneManager,
}

impl ApiContext {
    fn build_orchestrator(
        &self,
        session_id: &str,
        tz: TimezoneManager,
    ) -> Result<Arc<Orchestrator>, rusqlite::Error> {
        let llm = Arc::new(GroqService::new(self.groq_api_key.clone()));
        let calendar = Arc::new(GoogleCalendarClient::new(self.calendar_token.clone()));
        let db_path = format!("{}/events_{}.db", self.db_dir, session_id);
        Ok(Arc::new(Orchestrator::new(llm, calendar, tz, db_path)?))
    }

    async fn session(
        &self,
        session_id: &str,
        timezone: Option<&str>,
    ) -> Result<Arc<Orchestrator>, rusqlite::Error> {
        let tz = timezone
            .map(|name| TimezoneManager::new(Some(name)))
            .unwrap_or(self.default_timezone);
        self.registry
            .get_or_create(session_id, || self.build_orchestrator(session_id, tz))
            .await
    }
}

async fn handle_query(
    request: QueryRequest,
    ctx: Arc<ApiContext>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "Empty query"));
    }

    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let orchestrator = match ctx.session(&session_id, request.timezone.as_deref()).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            tracing::warn!(error = %err, session_id, "could not open session cache");
            return Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to open session cache",
            ));
        }
    };

    let turn = orchestrator.handle_turn(&query).await;
    tracing::info!(
        session_id,
        intent = turn.intent.as_str(),
        success = turn.success,
        "handled query turn"
    );
    Ok(warp::reply::with_status(
        warp::reply::json(&QueryResponse {
            success: turn.success,
            response: turn.response,
            intent: turn.intent.as_str().to_string(),
            events: turn.events,
            session_id,
        }),
        StatusCode::OK,
    ))
}

async fn handle_events(
    params: HashMap<String, String>,
    ctx: Arc<ApiContext>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    let Some(session_id) = params.get("session_id").filter(|id| !id.is_empty()) else {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "Missing session_id"));
    };

    let orchestrator = match ctx
        .session(session_id, params.get("timezone").map(String::as_str))
        .await
    {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            tracing::warn!(error = %err, session_id, "could not open session cache");
            return Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to open session cache",
            ));
        }
    };

    let events: Vec<EventSummary> = orchestrator
        .fetch_live_events()
        .await
        .iter()
        .map(EventSummary::from)
        .collect();
    Ok(warp::reply::with_status(
        warp::reply::json(&EventsResponse {
            success: true,
            events,
        }),
        StatusCode::OK,
    ))
}

pub async fn run_api(
    groq_api_key: String,
    calendar_token: String,
    db_dir: String,
    default_timezone: TimezoneManager,
    port: u16,
) {
    if let Err(err) = std::fs::create_dir_all(&db_dir) {
        tracing::warn!(error = %err, db_dir, "could not create cache directory");
    }

    let ctx = Arc::new(ApiContext {
        registry: SessionRegistry::new(constants::SESSION_TTL_MINUTES),
        groq_api_key,
        calendar_token,
        db_dir,
        default_timezone,
    });
    let with_ctx = {
        let ctx = ctx.clone();
        warp::any().map(move || ctx.clone())
    };

    let query_route = warp::path!("api" / "query")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_query);
    let events_route = warp::path!("api" / "events")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_ctx)
        .and_then(handle_events);

    tracing::info!(port, "serving calendar assistant API");
    warp::serve(query_route.or(events_route))
        .run(([0, 0, 0, 0], port))
        .await;
}
