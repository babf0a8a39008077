//! Planner error types with retry classification.
//!
//! Distinguishes between transient transport errors (should retry) and permanent
//! errors (should not retry).

use std::time::Duration;

/// Error from a remote planner call.
#[derive(Debug, Clone)]
pub struct PlannerError {
    /// The kind of error
    pub kind: PlannerErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Suggested retry delay (from Retry-After header)
    pub retry_after: Option<Duration>,
}

impl PlannerError {
    fn new(kind: PlannerErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(PlannerErrorKind::RateLimited, Some(429), message)
        }
    }

    /// Create a server error.
    pub fn server_error(status_code: u16, message: String) -> Self {
        Self::new(PlannerErrorKind::ServerError, Some(status_code), message)
    }

    /// Create an authentication error (401/403).
    pub fn unauthorized(status_code: u16, message: String) -> Self {
        Self::new(PlannerErrorKind::Unauthorized, Some(status_code), message)
    }

    /// Create a client error (bad request, unprocessable entity, ...).
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self::new(PlannerErrorKind::ClientError, Some(status_code), message)
    }

    /// Create a network error.
    pub fn network_error(message: String) -> Self {
        Self::new(PlannerErrorKind::NetworkError, None, message)
    }

    /// Create a timeout error.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            PlannerErrorKind::Timeout,
            None,
            format!("no response within {:?}", after),
        )
    }

    /// Create a parse error (response did not match the decision contract).
    pub fn parse_error(message: String) -> Self {
        Self::new(PlannerErrorKind::ParseError, None, message)
    }

    /// Build an error from an HTTP status and response body.
    pub fn from_status(status_code: u16, body: String, retry_after: Option<Duration>) -> Self {
        match classify_http_status(status_code) {
            PlannerErrorKind::RateLimited => Self::rate_limited(body, retry_after),
            PlannerErrorKind::Unauthorized => Self::unauthorized(status_code, body),
            PlannerErrorKind::ClientError => Self::client_error(status_code, body),
            _ => Self::server_error(status_code, body),
        }
    }

    /// Check if this error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Get the delay before the next attempt.
    ///
    /// Returns `retry_after` if the server supplied one, otherwise
    /// `initial * multiplier^attempt`, capped at `max`.
    pub fn suggested_delay(&self, attempt: u32, config: &RetryConfig) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after.min(config.max_delay);
        }

        let factor = config.multiplier.max(1.0).powi(attempt as i32);
        let millis = (config.initial_delay.as_millis() as f64 * factor)
            .min(config.max_delay.as_millis() as f64);

        Duration::from_millis(millis as u64)
    }
}

impl std::fmt::Display for PlannerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for PlannerError {}

/// Classification of planner errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorKind {
    /// Rate limited (429) - transient, should retry with backoff
    RateLimited,
    /// Server error (5xx) - transient, should retry
    ServerError,
    /// Connection failed - transient, should retry
    NetworkError,
    /// No response within the request timeout - transient, should retry
    Timeout,
    /// Invalid credentials (401, 403) - permanent
    Unauthorized,
    /// Other 4xx - permanent
    ClientError,
    /// Response was not a valid decision - permanent
    ParseError,
}

impl PlannerErrorKind {
    /// Stable machine-readable name, e.g. `rate_limited`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlannerErrorKind::RateLimited => "rate_limited",
            PlannerErrorKind::ServerError => "server_error",
            PlannerErrorKind::NetworkError => "network_error",
            PlannerErrorKind::Timeout => "timeout",
            PlannerErrorKind::Unauthorized => "unauthorized",
            PlannerErrorKind::ClientError => "client_error",
            PlannerErrorKind::ParseError => "parse_error",
        }
    }

    /// Check if this error kind is transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlannerErrorKind::RateLimited
                | PlannerErrorKind::ServerError
                | PlannerErrorKind::NetworkError
                | PlannerErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for PlannerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannerErrorKind::RateLimited => write!(f, "Rate limited"),
            PlannerErrorKind::ServerError => write!(f, "Server error"),
            PlannerErrorKind::NetworkError => write!(f, "Network error"),
            PlannerErrorKind::Timeout => write!(f, "Timeout"),
            PlannerErrorKind::Unauthorized => write!(f, "Unauthorized"),
            PlannerErrorKind::ClientError => write!(f, "Client error"),
            PlannerErrorKind::ParseError => write!(f, "Parse error"),
        }
    }
}

/// Configuration for planner transport retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt
    pub multiplier: f64,
    /// Maximum total time to spend retrying
    pub max_retry_duration: Duration,
    /// Whether to retry on rate limit errors
    pub retry_rate_limits: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_retry_duration: Duration::from_secs(120),
            retry_rate_limits: true,
        }
    }
}

impl RetryConfig {
    /// Check if the given error should be retried based on this config.
    pub fn should_retry(&self, error: &PlannerError) -> bool {
        match error.kind {
            PlannerErrorKind::RateLimited => self.retry_rate_limits,
            kind => kind.is_transient(),
        }
    }
}

/// Parse HTTP status code into error kind.
pub fn classify_http_status(status: u16) -> PlannerErrorKind {
    match status {
        429 => PlannerErrorKind::RateLimited,
        401 | 403 => PlannerErrorKind::Unauthorized,
        400..=499 => PlannerErrorKind::ClientError,
        _ => PlannerErrorKind::ServerError,
    }
}
