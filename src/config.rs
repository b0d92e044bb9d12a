//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Hourly, on the hour (`cron` crate syntax, seconds first).
pub const DEFAULT_SCHEDULE: &str = "0 0 * * * *";

/// Service configuration.
///
/// `table_name`, `openai_api_key` and `queue_url` are required by their
/// stages but deliberately not validated here: an empty value makes the
/// first downstream call fail instead.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Store table identifier.
    pub table_name: String,
    /// Completion-API credential.
    pub openai_api_key: SecretString,
    /// Queue endpoint identifier.
    pub queue_url: String,
    /// libSQL database file backing both store and queue.
    pub db_path: String,
    /// Completion model name.
    pub model: String,
    /// Completion API base URL.
    pub openai_base_url: String,
    /// Port for the HTTP trigger.
    pub http_port: u16,
    /// Cron expression for the generation ticker.
    pub schedule: String,
    /// How long a received envelope stays hidden before redelivery.
    pub visibility_timeout: Duration,
    /// Receives after which an envelope is dead-lettered.
    pub max_receive_count: u32,
    /// Worker sleep when the queue is empty.
    pub poll_interval: Duration,
    /// Interval of the recovery job (`None` = disabled).
    pub reconcile_interval: Option<Duration>,
    /// Minimum age of an orphaned message before it is re-enqueued.
    pub reconcile_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            openai_api_key: SecretString::from(""),
            queue_url: String::new(),
            db_path: "./data/dialogue.db".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            http_port: 8080,
            schedule: DEFAULT_SCHEDULE.to_string(),
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 5,
            poll_interval: Duration::from_millis(1000),
            reconcile_interval: None,
            reconcile_grace: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl PipelineConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let schedule = text("DIALOGUE_SCHEDULE", &defaults.schedule);
        crate::scheduler::next_fire(&schedule)?;

        let reconcile_secs: u64 = parse_number(&lookup, "DIALOGUE_RECONCILE_INTERVAL_SECS", 0)?;

        Ok(Self {
            table_name: text("TABLE_NAME", ""),
            openai_api_key: SecretString::from(text("OPENAI_API_KEY", "")),
            queue_url: text("QUEUE_URL", ""),
            db_path: text("DIALOGUE_DB_PATH", &defaults.db_path),
            model: text("DIALOGUE_MODEL", &defaults.model),
            openai_base_url: text("OPENAI_BASE_URL", &defaults.openai_base_url),
            http_port: parse_number(&lookup, "DIALOGUE_HTTP_PORT", defaults.http_port)?,
            schedule,
            visibility_timeout: Duration::from_secs(parse_number(
                &lookup,
                "DIALOGUE_VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout.as_secs(),
            )?),
            max_receive_count: parse_number(
                &lookup,
                "DIALOGUE_MAX_RECEIVE_COUNT",
                defaults.max_receive_count,
            )?,
            poll_interval: Duration::from_millis(parse_number(
                &lookup,
                "DIALOGUE_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            reconcile_grace: Duration::from_secs(parse_number(
                &lookup,
                "DIALOGUE_RECONCILE_GRACE_SECS",
                defaults.reconcile_grace.as_secs(),
            )?),
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
