//! Configuration and settings management
//!
//! Loads settings from environment variables and defines the tuning
//! constants for timing simulation, rate limiting, and greeting detection.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// OpenAI API key for the report classifier
    pub openai_api_key: Option<String>,

    /// Base URL of the report-storage backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Path of the report-creation endpoint
    #[serde(default = "default_reports_endpoint")]
    pub reports_endpoint: String,

    /// Total messages the bot may process per calendar day
    #[serde(default = "default_max_messages_per_day")]
    pub max_messages_per_day: u32,

    /// Informational hourly ceiling, logged at startup
    #[serde(default = "default_max_messages_per_hour")]
    pub max_messages_per_hour: u32,

    /// Messages a single sender may send within the trailing hour
    #[serde(default = "default_max_messages_per_sender")]
    pub max_messages_per_sender: usize,
}

fn default_backend_url() -> String {
    "https://zta.148.230.91.96.nip.io".to_string()
}

fn default_reports_endpoint() -> String {
    "/api/reports".to_string()
}

const fn default_max_messages_per_day() -> u32 {
    200
}

const fn default_max_messages_per_hour() -> u32 {
    50
}

const fn default_max_messages_per_sender() -> usize {
    10
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }
}

/// Delay constants for human-like timing simulation
pub mod delays {
    use std::time::Duration;

    /// Lower bound of the generic response pause band
    pub const MIN_RESPONSE_TIME: Duration = Duration::from_millis(2000);
    /// Upper bound of the generic response pause band
    pub const MAX_RESPONSE_TIME: Duration = Duration::from_millis(8000);

    /// Simulated reading speed per character of inbound text
    pub const READ_TIME_PER_CHAR: Duration = Duration::from_millis(60);
    /// Minimum simulated read time
    pub const MIN_READ_TIME: Duration = Duration::from_millis(1000);
    /// Maximum simulated read time (before jitter)
    pub const MAX_READ_TIME: Duration = Duration::from_millis(4000);
    /// Read-time bonus when the message spans multiple lines
    pub const READ_BONUS_MULTILINE: Duration = Duration::from_millis(500);
    /// Read-time bonus when the message contains a 7-8 digit number
    pub const READ_BONUS_LONG_NUMBER: Duration = Duration::from_millis(300);
    /// Read-time bonus when the message has more than five words
    pub const READ_BONUS_MANY_WORDS: Duration = Duration::from_millis(200);
    /// Maximum random jitter added to the read time
    pub const READ_JITTER: Duration = Duration::from_millis(500);

    /// Flat component of the simulated typing time
    pub const TYPING_BASE: Duration = Duration::from_millis(2000);
    /// Simulated typing speed per character of the outgoing reply
    pub const TYPING_PER_CHAR: Duration = Duration::from_millis(30);
    /// Minimum simulated typing time
    pub const MIN_TYPING_TIME: Duration = Duration::from_millis(2000);
    /// Maximum simulated typing time (before jitter)
    pub const MAX_TYPING_TIME: Duration = Duration::from_millis(6000);
    /// Maximum random jitter added to the typing time
    pub const TYPING_JITTER: Duration = Duration::from_millis(1000);

    /// Fixed pause before throttling notices and top-level apologies
    pub const NOTICE_PAUSE: Duration = Duration::from_millis(2000);
}

/// Keywords that route an INITIAL-state message to the welcome reply
/// instead of the classifier (matched case-insensitively, by substring)
pub const GREETING_KEYWORDS: &[&str] = &[
    "hola",
    "buenos dias",
    "buenas tardes",
    "buenas noches",
    "buen dia",
    "buena tarde",
    "buena noche",
    "saludos",
    "inicio",
    "iniciar",
    "empezar",
    "comenzar",
    "menu",
    "menú",
    "ayuda",
    "help",
];

/// Randomized greeting openings so replies do not look templated
pub const SALUDOS: &[&str] = &["Hola! 👋", "¡Hola! 😊", "¡Buen día!", "¡Hola, bienvenido/a!"];

/// Model used by the report classifier
pub const CLASSIFIER_MODEL: &str = "gpt-4o-mini";
/// Sampling temperature for the classifier call
pub const CLASSIFIER_TEMPERATURE: f32 = 0.3;
/// Output token cap for the classifier call
pub const CLASSIFIER_MAX_TOKENS: u32 = 150;
/// Timeout for the classifier call, in seconds
pub const CLASSIFIER_TIMEOUT_SECS: u64 = 30;

/// Timeout for the report-submission call, in seconds
pub const GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Trailing window over which per-sender message counts are evaluated
pub const RATE_WINDOW_SECS: i64 = 3600;
