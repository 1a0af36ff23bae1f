pub mod calendar_client;
pub mod groq_client;
