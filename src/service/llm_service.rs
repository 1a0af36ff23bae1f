use async_trait::async_trait;

use crate::clients::groq_client::{self, LlmTask};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        task: LlmTask,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct GroqService {
    api_key: String,
}

impl GroqService {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

#[async_trait]
impl LlmClient for GroqService {
    async fn complete(
        &self,
        task: LlmTask,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        groq_client::complete(task, prompt, &self.api_key).await
    }
}
