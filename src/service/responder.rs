use std::sync::Arc;

use crate::clients::groq_client::LlmTask;
use crate::constants;
use crate::models::event::CalendarEvent;
use crate::service::llm_service::LlmClient;

/// Turns event lists into conversational replies. Model failures fall
/// back to a templated count message instead of surfacing an error.
pub struct ResponseService {
    llm: Arc<dyn LlmClient>,
}

impl ResponseService {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Reply for cache query results.
    pub async fn respond(&self, utterance: &str, events: &[CalendarEvent]) -> String {
        let mut events_text = String::new();
        for event in events.iter().take(constants::MAX_EVENTS_FOR_RESPONSE) {
            events_text.push_str(&format!(
                "- {} on {} from {} to {}",
                event.summary,
                event.start.format("%B %d"),
                event.start.format("%I:%M %p"),
                event.end.format("%I:%M %p"),
            ));
            if !event.location.is_empty() {
                events_text.push_str(&format!(" at {}", event.location));
            }
            events_text.push('\n');
        }

        let prompt = format!(
            "User asked: \"{utterance}\"\n\n\
             Query results:\n{results}\n\
             Generate a natural, conversational response to the user's question based on these results. Be concise and friendly.",
            results = if events.is_empty() {
                "No events found.\n".to_string()
            } else {
                events_text
            },
        );

        match self.llm.complete(LlmTask::Response, &prompt).await {
            Ok(reply) => reply.trim().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "response generation failed, using fallback");
                fallback_message(events.len())
            }
        }
    }

    /// Free-text answer over the provider's live event list; used when
    /// query translation fails. The cache plays no part here.
    pub async fn answer(&self, utterance: &str, events: &[CalendarEvent]) -> String {
        let mut events_text = String::new();
        for event in events.iter().take(constants::MAX_EVENTS_FOR_RESPONSE) {
            events_text.push_str(&format!(
                "- {} on {}\n",
                event.summary,
                event.start.format("%B %d at %I:%M %p"),
            ));
        }

        let prompt = format!(
            "Answer this question about calendar events:\n\n\
             User question: \"{utterance}\"\n\n\
             Events:\n{events_text}\n\
             Provide a clear, concise answer."
        );

        match self.llm.complete(LlmTask::Answer, &prompt).await {
            Ok(reply) => reply.trim().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "answer generation failed, using fallback");
                fallback_message(events.len())
            }
        }
    }
}

fn fallback_message(count: usize) -> String {
    if count == 0 {
        "I don't see any events matching your request.".to_string()
    } else {
        format!("Found {count} event(s) matching your query.")
    }
}
