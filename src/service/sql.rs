use std::sync::Arc;

use crate::clients::groq_client::{LlmTask, strip_code_fences};
use crate::service::llm_service::LlmClient;
use crate::timezone::TimezoneManager;

fn is_select(sql: &str) -> bool {
    sql.trim_start().to_lowercase().starts_with("select")
}

/// Translates a free-text question into a SELECT against the cache. The
/// timezone modifier shifts UTC-stored timestamps into the user's civil
/// day for relative-date phrases.
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Anything that is not a single SELECT counts as a generation
    /// failure; the caller falls back to answering over live events.
    pub async fn text_to_sql(
        &self,
        utterance: &str,
        schema: &str,
        tz: &TimezoneManager,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let modifier = tz.offset_modifier();
        let user_today = tz.now_in_user_tz().format("%Y-%m-%d").to_string();

        let today_example = format!(
            "SELECT * FROM events WHERE date(datetime(start_time, '{modifier}')) = date(datetime('now', '{modifier}'))"
        );
        let tomorrow_example = format!(
            "SELECT * FROM events WHERE date(datetime(start_time, '{modifier}')) = date(datetime('now', '{modifier}', '+1 day'))"
        );
        let week_example = format!(
            "SELECT * FROM events WHERE date(datetime(start_time, '{modifier}')) >= date(datetime('now', '{modifier}')) AND date(datetime(start_time, '{modifier}')) <= date(datetime('now', '{modifier}', '+7 days'))"
        );

        let prompt = format!(
            "Convert this natural language query to SQL for the events table.\n\n\
             Schema:\n{schema}\n\n\
             User query: \"{utterance}\"\n\n\
             Return ONLY a valid SQL SELECT query. Use SQLite syntax.\n\
             IMPORTANT:\n\
             - Use '+1 day' (with plus sign) for tomorrow, NOT '1 day'\n\
             - Timestamps are stored in UTC format (YYYY-MM-DD HH:MM:SS) in the database\n\
             - Use datetime() with timezone modifier '{modifier}' to convert UTC to user timezone\n\
             - Then use date() to extract date part for comparisons\n\
             - Current date in user timezone: {user_today}\n\
             - Timezone modifier to use: '{modifier}' (apply to both 'now' and start_time)\n\n\
             Examples:\n\
             - \"show all events\" -> SELECT * FROM events ORDER BY start_time\n\
             - \"events today\" -> {today_example}\n\
             - \"events tomorrow\" -> {tomorrow_example}\n\
             - \"events tomorrow after 5pm\" -> SELECT * FROM events WHERE date(datetime(start_time, '{modifier}')) = date(datetime('now', '{modifier}', '+1 day')) AND time(datetime(start_time, '{modifier}')) > '17:00:00'\n\
             - \"meetings with john\" -> SELECT * FROM events WHERE attendees LIKE '%john%'\n\
             - \"events this week\" -> {week_example}\n\n\
             SQL query:"
        );

        let raw = self.llm.complete(LlmTask::SqlQuery, &prompt).await?;
        let sql = strip_code_fences(&raw);
        if sql.is_empty() {
            return Err("empty SQL generation".to_string().into());
        }
        if !is_select(&sql) {
            return Err(format!("generated statement is not a SELECT: {sql}").into());
        }
        Ok(sql)
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
    async fn accepts_fenced_select() {
        let generator = SqlGenerator::new(Arc::new(FakeLlm {
            response: Ok("```sql\nSELECT * FROM events ORDER BY start_time\n```".to_string()),
        }));
        let sql = generator
            .text_to_sql("show all events", "Table: events", &TimezoneManager::default())
            .await
            .unwrap();
        assert_eq!(sql, "SELECT * FROM events ORDER BY start_time");
    }

    #[tokio::test]
    async fn rejects_non_select_statements() {
        let generator = SqlGenerator::new(Arc::new(FakeLlm {
            response: Ok("DELETE FROM events".to_string()),
        }));
        assert!(
            generator
                .text_to_sql("wipe it", "Table: events", &TimezoneManager::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn propagates_completion_failure() {
        let generator = SqlGenerator::new(Arc::new(FakeLlm {
            response: Err("rate limited".to_string()),
        }));
        assert!(
            generator
                .text_to_sql("events today", "Table: events", &TimezoneManager::default())
                .await
                .is_err()
        );
    }
}
