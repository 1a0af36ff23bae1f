use std::sync::Arc;

use serde::Deserialize;

use crate::clients::groq_client::{LlmTask, strip_code_fences};
use crate::models::event::CalendarEvent;
use crate::service::llm_service::LlmClient;

#[derive(Debug, Clone, Deserialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
}

/// Post-mutation sanity check: does the cache row (or its absence, for
/// cancellations) match what the utterance asked for? Any internal error
/// resolves to valid — this check must never block a mutation that
/// already happened.
pub struct ValidationService {
    llm: Arc<dyn LlmClient>,
}

impl ValidationService {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn validate(
        &self,
        utterance: &str,
        action_kind: &str,
        event: Option<&CalendarEvent>,
    ) -> Validation {
        let event_info = match event {
            Some(event) => format!(
                "Summary: {}, Start: {}, End: {}",
                event.summary,
                event.start.format("%Y-%m-%d %I:%M %p"),
                event.end.format("%Y-%m-%d %I:%M %p"),
            ),
            None => "Event not found or was deleted".to_string(),
        };

        let prompt = format!(
            "User requested: \"{utterance}\"\n\
             Action performed: {action_kind}\n\
             Result in database: {event_info}\n\n\
             Check if the action result matches what the user requested. Return JSON:\n\
             {{\"valid\": true/false, \"message\": \"explanation\"}}\n\n\
             If the result doesn't match the user's request, set valid to false."
        );

        let raw = match self.llm.complete(LlmTask::Validation, &prompt).await {
            Ok(raw) => raw,
            Err(err) => return Validation::fail_open(err.to_string()),
        };

        match serde_json::from_str::<Validation>(&strip_code_fences(&raw)) {
            Ok(validation) => validation,
            Err(err) => Validation::fail_open(err.to_string()),
        }
    }
}

impl Validation {
    fn fail_open(err: String) -> Self {
        tracing::warn!(error = %err, "validation check failed, assuming valid");
        Self {
            valid: true,
            message: format!("Validation error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeLlm {
        response: Result<String, String>,
    }

    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn complete(
            &self,
            _task: LlmTask,
            _prompt: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            match &self.response {
                Ok(body) => Ok(body.clone()),
                Err(err) => Err(err.clone().into()),
            }
        }
    }

    #[tokio::test]
    async fn reports_mismatches_from_the_model() {
        let validator = ValidationService::new(Arc::new(FakeLlm {
            response: Ok(r#"{"valid": false, "message": "wrong day"}"#.to_string()),
        }));
        let validation = validator.validate("move it to Friday", "modify", None).await;
        assert!(!validation.valid);
        assert_eq!(validation.message, "wrong day");
    }

    #[tokio::test]
    async fn errors_and_garbage_resolve_to_valid() {
        let validator = ValidationService::new(Arc::new(FakeLlm {
            response: Err("timeout".to_string()),
        }));
        assert!(validator.validate("cancel lunch", "cancel", None).await.valid);

        let validator = ValidationService::new(Arc::new(FakeLlm {
            response: Ok("definitely not json".to_string()),
        }));
        assert!(validator.validate("cancel lunch", "cancel", None).await.valid);
    }
}
