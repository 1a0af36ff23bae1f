use std::sync::Arc;

use clap::{Parser, Subcommand};
use inquire::Text;

use crate::clients::calendar_client::{CalendarApi, GoogleCalendarClient};
use crate::constants;
use crate::orchestrator::Orchestrator;
use crate::service::intent::Intent;
use crate::service::llm_service::GroqService;
use crate::timezone::TimezoneManager;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive assistant session (default)
    Repl,
    /// One-shot natural-language request
    Query { text: String },
    /// Rebuild the local event cache from the provider
    Sync,
}

pub async fn cli(groq_api_key: String, calendar_token: String, user_timezone: Option<String>) {
    // Fine to panic here
    let cli = Cli::parse();

    let llm = Arc::new(GroqService::new(groq_api_key));
    let calendar: Arc<dyn CalendarApi> = Arc::new(GoogleCalendarClient::new(calendar_token));

    // Show the provider's own zone before asking for one.
    match calendar.calendar_timezone().await {
        Ok(name) => println!("\nYour calendar timezone: {name}"),
        Err(err) => {
            println!("\nCould not retrieve calendar timezone: {err}");
            println!("Defaulting to UTC");
        }
    }

    let tz = match user_timezone {
        Some(name) => TimezoneManager::new(Some(&name)),
        None => prompt_timezone(),
    };

    let orchestrator = match Orchestrator::new(llm, calendar, tz, constants::DB_PATH) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            eprintln!("Unable to open event cache: {err}");
            return;
        }
    };

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => repl(&orchestrator).await,
        Commands::Query { text } => {
            orchestrator.resync().await;
            let turn = orchestrator.handle_turn(&text).await;
            println!("{}", turn.response);
        }
        Commands::Sync => {
            let stored = orchestrator.resync().await;
            println!("Synced {stored} event(s) into the cache.");
        }
    }
}

async fn repl(orchestrator: &Orchestrator) {
    println!("\nCalendar Assistant - Type your request or 'quit' to exit\n");
    println!("Syncing calendar events to database...");
    orchestrator.resync().await;
    println!("Ready!\n");
    print_cached_events(orchestrator);

    loop {
        let input = match Text::new("Enter your query:").prompt() {
            Ok(text) => text,
            Err(_) => break,
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let turn = orchestrator.handle_turn(input).await;
        println!("{}\n", turn.response);
        if turn.intent == Intent::Quit {
            break;
        }
    }
}

fn print_cached_events(orchestrator: &Orchestrator) {
    let events = orchestrator.cache().query(constants::DEFAULT_EVENTS_SQL);
    println!("{}", "=".repeat(60));
    println!("DATABASE CONTENTS:");
    println!("{}", "=".repeat(60));
    if events.is_empty() {
        println!("No events in database.");
    }
    for event in events {
        println!("ID: {}", event.id);
        println!("  Summary: {}", event.summary);
        println!("  Start: {}", event.start.format("%Y-%m-%d %I:%M %p"));
        println!("  End: {}", event.end.format("%Y-%m-%d %I:%M %p"));
        println!(
            "  Location: {}",
            if event.location.is_empty() {
                "N/A"
            } else {
                event.location.as_str()
            }
        );
        println!(
            "  Attendees: {}",
            if event.attendees.is_empty() {
                "None".to_string()
            } else {
                event.attendees.join(", ")
            }
        );
        println!();
    }
    println!("{}\n", "=".repeat(60));
}

fn prompt_timezone() -> TimezoneManager {
    println!("\nPlease enter your timezone.");
    println!(
        "Examples: 'America/New_York', 'America/Los_Angeles', 'Europe/London', 'Asia/Kolkata', 'UTC'"
    );
    println!("Or type 'list' to see common timezones.");

    loop {
        let input = Text::new("Timezone:").prompt().unwrap_or_default();
        let input = input.trim();

        if input.eq_ignore_ascii_case("list") {
            print_common_timezones();
            continue;
        }
        if input.is_empty() {
            println!("Using UTC as default.");
            return TimezoneManager::default();
        }

        match TimezoneManager::parse(input) {
            Ok(tz) => {
                println!("Timezone set to: {}", tz.name());
                return tz;
            }
            Err(_) => println!("Invalid timezone. Please try again or type 'list' for options."),
        }
    }
}

fn print_common_timezones() {
    let common = [
        ("UTC", "UTC"),
        ("America/New_York", "Eastern Time (US)"),
        ("America/Chicago", "Central Time (US)"),
        ("America/Denver", "Mountain Time (US)"),
        ("America/Los_Angeles", "Pacific Time (US)"),
        ("Europe/London", "London"),
        ("Europe/Paris", "Paris"),
        ("Asia/Kolkata", "India"),
        ("Asia/Tokyo", "Tokyo"),
        ("Australia/Sydney", "Sydney"),
    ];
    println!("\nCommon timezones:");
    for (tz, desc) in common {
        println!("  {tz:25} - {desc}");
    }
}
