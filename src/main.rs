#![allow(non_snake_case)]

use std::env;

use tracing_subscriber::EnvFilter;

use calendarBot::config::AppConfig;
use calendarBot::timezone::TimezoneManager;
use calendarBot::{api, cli, constants};

const DEFAULT_RUN_MODE: &str = "cli";
const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match env::var("CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    };

    let run_mode = config
        .get("RUN_MODE")
        .unwrap_or(DEFAULT_RUN_MODE.to_string());
    let groq_api_key = config
        .get("GROQ_API_KEY")
        .expect("GROQ_API_KEY environment variable not set");
    let calendar_token = config
        .get("CALENDAR_ACCESS_TOKEN")
        .expect("CALENDAR_ACCESS_TOKEN environment variable not set");

    if run_mode == "api" {
        let db_dir = config
            .get("DB_DIR")
            .unwrap_or(constants::DEFAULT_DB_DIR.to_string());
        let port = config
            .get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let tz = TimezoneManager::new(config.get("USER_TIMEZONE").as_deref());
        api::run_api(groq_api_key, calendar_token, db_dir, tz, port).await;
    } else if run_mode == "cli" {
        cli::cli(groq_api_key, calendar_token, config.get("USER_TIMEZONE")).await;
    } else {
        println!("Invalid run mode {}", run_mode);
    }
}
