use std::sync::Arc;

use crate::clients::groq_client::LlmTask;
use crate::service::llm_service::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Query,
    Create,
    Modify,
    Cancel,
    Quit,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::Create => "create",
            Intent::Modify => "modify",
            Intent::Cancel => "cancel",
            Intent::Quit => "quit",
        }
    }
}

/// Maps a raw classification token to an intent. Anything outside the
/// valid vocabulary becomes `Query`: defaulting to the least destructive
/// action on unclear input is deliberate fail-open behavior.
pub fn parse_intent(raw: &str) -> Intent {
    match raw.trim().to_lowercase().as_str() {
        "create" => Intent::Create,
        "modify" => Intent::Modify,
        "cancel" => Intent::Cancel,
        "quit" => Intent::Quit,
        _ => Intent::Query,
    }
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classification failures also resolve to `Query`.
    pub async fn classify(&self, utterance: &str) -> Intent {
        let prompt = format!(
            "Classify the user's intent into one of these categories:\n\
             - 'query': User wants information about events (e.g., \"show events\", \"what's on my calendar\", \"events tomorrow\")\n\
             - 'create': User wants to create a new event (e.g., \"schedule a meeting\", \"create event\", \"add appointment\")\n\
             - 'modify': User wants to modify an existing event (e.g., \"change time\", \"update event\", \"reschedule\")\n\
             - 'cancel': User wants to cancel/delete an event (e.g., \"cancel meeting\", \"delete event\", \"remove appointment\")\n\
             - 'quit': User wants to stop/exit/quit the application (e.g., \"quit\", \"exit\", \"stop\", \"bye\", \"goodbye\", \"I'm done\")\n\n\
             User query: \"{utterance}\"\n\n\
             Return ONLY one word: query, create, modify, cancel, or quit"
        );

        match self.llm.complete(LlmTask::Intent, &prompt).await {
            Ok(raw) => parse_intent(&raw),
            Err(err) => {
                tracing::warn!(error = %err, "intent classification failed, defaulting to query");
                Intent::Query
            }
        }
    }
}
