//! Configuration management for the GAME runtime.
//!
//! Configuration can be set via environment variables:
//! - `GAME_API_KEY` - Required. API key for the remote planner.
//! - `GAME_API_BASE_URL` - Optional. Planner base URL. Defaults to `https://sdk.game.virtuals.io/v2`.
//! - `GAME_REQUEST_TIMEOUT` - Optional. Seconds to wait for one planner response. Defaults to `30`.
//! - `GAME_FUNCTION_TIMEOUT` - Optional. Seconds a single function may run. Unbounded if unset.
//! - `GAME_MAX_RETRIES` - Optional. Transport retries per planner call. Defaults to `3`.
//! - `GAME_RETRY_DELAY_MS` - Optional. Initial retry backoff in milliseconds. Defaults to `1000`.
//! - `GAME_WORKER_MAX_STEPS` - Optional. Function calls per worker run. Defaults to `20`.
//! - `GAME_AGENT_MAX_STEPS` - Optional. Delegations per agent run. Defaults to `100`.
//! - `GAME_HISTORY_WINDOW` - Optional. Session entries sent with each request. Defaults to `10`.
//! - `GAME_FAILURE_POLICY` - Optional. `report` or `escalate`. Defaults to `report`.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::agents::FailurePolicy;
use crate::planner::RetryConfig;

pub const DEFAULT_BASE_URL: &str = "https://sdk.game.virtuals.io/v2";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Runtime configuration, passed explicitly into workers and agents.
#[derive(Debug, Clone)]
pub struct Config {
    /// Planner API key
    pub api_key: String,

    /// Planner base URL, without a trailing slash
    pub base_url: String,

    /// Upper bound on one planner request
    pub request_timeout: Duration,

    /// Upper bound on one function invocation
    pub function_timeout: Option<Duration>,

    /// Transport retries after the first planner call
    pub max_retries: u32,

    /// Delay before the first transport retry
    pub retry_delay: Duration,

    /// Maximum function calls in one worker run
    pub worker_max_steps: usize,

    /// Maximum delegations in one agent run
    pub agent_max_steps: usize,

    /// Number of recent session entries included in decision requests
    pub history_window: usize,

    /// What an agent does when a worker run fails
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `GAME_API_KEY` is not set, and
    /// `ConfigError::InvalidValue` for anything that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GAME_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("GAME_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "GAME_API_KEY".to_string(),
                "API key not set".to_string(),
            ));
        }

        let raw_url = lookup("GAME_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&raw_url)
            .map_err(|e| ConfigError::InvalidValue("GAME_API_BASE_URL".to_string(), e))?;

        let request_timeout =
            Duration::from_secs(parse_or(&lookup, "GAME_REQUEST_TIMEOUT", 30u64)?);
        let function_timeout = match lookup("GAME_FUNCTION_TIMEOUT") {
            Some(raw) => Some(Duration::from_secs(parse_value("GAME_FUNCTION_TIMEOUT", &raw)?)),
            None => None,
        };
        let max_retries = parse_or(&lookup, "GAME_MAX_RETRIES", 3u32)?;
        let retry_delay = Duration::from_millis(parse_or(&lookup, "GAME_RETRY_DELAY_MS", 1000u64)?);
        let worker_max_steps = parse_or(&lookup, "GAME_WORKER_MAX_STEPS", 20usize)?;
        let agent_max_steps = parse_or(&lookup, "GAME_AGENT_MAX_STEPS", 100usize)?;
        let history_window = parse_or(&lookup, "GAME_HISTORY_WINDOW", 10usize)?;
        let failure_policy = parse_or(&lookup, "GAME_FAILURE_POLICY", FailurePolicy::Report)?;

        let config = Self {
            api_key,
            base_url,
            request_timeout,
            function_timeout,
            max_retries,
            retry_delay,
            worker_max_steps,
            agent_max_steps,
            history_window,
            failure_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a config with default values (useful for testing).
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            function_timeout: None,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            worker_max_steps: 20,
            agent_max_steps: 100,
            history_window: 10,
            failure_policy: FailurePolicy::Report,
        }
    }

    /// Check limits that would make a run impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_max_steps == 0 {
            return Err(ConfigError::InvalidValue(
                "GAME_WORKER_MAX_STEPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.agent_max_steps == 0 {
            return Err(ConfigError::InvalidValue(
                "GAME_AGENT_MAX_STEPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "GAME_REQUEST_TIMEOUT".to_string(),
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Transport retry settings derived from this config.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: self.retry_delay,
            ..RetryConfig::default()
        }
    }
}

fn parse_base_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
