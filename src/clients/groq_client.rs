use serde::{Deserialize, Serialize};

use crate::constants;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// One completion task per pipeline step. Each carries its own system
/// message and sampling parameters; callers build the user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmTask {
    Intent,
    ParseCreate,
    ParseModify,
    ParseCancel,
    SqlQuery,
    Response,
    Answer,
    Validation,
    ConflictNotice,
}

impl LlmTask {
    fn system_message(self) -> &'static str {
        match self {
            LlmTask::Intent => "You are an intent classifier. Return only the intent word.",
            LlmTask::ParseCreate | LlmTask::ParseModify | LlmTask::ParseCancel => {
                "You are a calendar event parser. Return ONLY valid JSON, no explanations, \
                 no markdown, just the JSON object."
            }
            LlmTask::SqlQuery => {
                "You are a SQL query generator. Return ONLY valid SQL, no explanations."
            }
            LlmTask::Response | LlmTask::Answer | LlmTask::ConflictNotice => {
                "You are a helpful calendar assistant. Provide natural, conversational responses."
            }
            LlmTask::Validation => "You are a validation agent. Return only valid JSON.",
        }
    }

    fn temperature(self) -> f32 {
        match self {
            LlmTask::Intent => constants::INTENT_TEMPERATURE,
            LlmTask::Validation => constants::VALIDATION_TEMPERATURE,
            _ => constants::LLM_TEMPERATURE,
        }
    }

    fn max_tokens(self) -> u32 {
        match self {
            LlmTask::Intent => constants::INTENT_MAX_TOKENS,
            LlmTask::Validation => constants::VALIDATION_MAX_TOKENS,
            _ => constants::LLM_MAX_TOKENS,
        }
    }
}

pub async fn complete(
    task: LlmTask,
    prompt: &str,
    api_key: &str,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let request = ChatRequest {
        model: constants::LLM_MODEL.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: task.system_message().to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ],
        max_tokens: task.max_tokens(),
        temperature: task.temperature(),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(constants::LLM_API_URL)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::warn!(%status, body = %text, "completion request rejected");
        return Err(format!("Request failed with status {}", status).into());
    }

    let parsed: ChatResponse = serde_json::from_str(&text)
        .map_err(|e| format!("Failed to parse JSON: {}\nRaw body: {}", e, text))?;

    match parsed.choices.first() {
        Some(choice) => Ok(choice.message.content.clone()),
        None => Err("No response from completion endpoint".to_string().into()),
    }
}

/// Models wrap JSON or SQL in Markdown fences despite instructions.
/// Returns the text between the first fence pair, with any `json`/`sql`
/// language tag removed; text without fences passes through trimmed.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut parts = trimmed.splitn(3, "```");
    let _ = parts.next();
    let inner = parts.next().unwrap_or("");
    let inner = inner
        .strip_prefix("json")
        .or_else(|| inner.strip_prefix("sql"))
        .unwrap_or(inner);
    inner.trim().to_string()
}
