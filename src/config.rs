use std::collections::HashMap;
use std::env;
use std::fs;

#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, String> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(format!("Invalid config line {}: {}", idx + 1, line));
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    // File value wins, env is the fallback.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exports_quotes_and_comments() {
        let config = AppConfig::parse(
            "# comment\nexport GROQ_API_KEY=\"abc\"\nUSER_TIMEZONE='America/New_York'\nRUN_MODE=cli\n",
        )
        .unwrap();
        assert_eq!(config.values.get("GROQ_API_KEY").unwrap(), "abc");
        assert_eq!(
            config.values.get("USER_TIMEZONE").unwrap(),
            "America/New_York"
        );
        assert_eq!(config.values.get("RUN_MODE").unwrap(), "cli");
    }

    #[test]
    fn rejects_lines_without_assignment() {
        assert!(AppConfig::parse("JUST_A_WORD\n").is_err());
    }
}
