//! Error classification and retry policy for LLM requests.

use std::fmt;
use std::time::Duration;

/// Broad category of a failed LLM request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429 from the provider
    RateLimited,
    /// 5xx from the provider
    ServerError,
    /// 4xx other than 429 (bad key, bad request)
    ClientError,
    /// Timeout, connection refused, DNS failure
    NetworkError,
    /// Response body did not match the completion schema
    ParseError,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError => write!(f, "server_error"),
            Self::ClientError => write!(f, "client_error"),
            Self::NetworkError => write!(f, "network_error"),
            Self::ParseError => write!(f, "parse_error"),
        }
    }
}

/// Map an HTTP status code onto an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        _ => LlmErrorKind::ClientError,
    }
}

/// A failed LLM request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            kind: LlmErrorKind::RateLimited,
            message,
            status: Some(429),
            retry_after,
        }
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Self {
            kind: LlmErrorKind::ServerError,
            message,
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn client_error(status: u16, message: String) -> Self {
        Self {
            kind: LlmErrorKind::ClientError,
            message,
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn network_error(message: String) -> Self {
        Self {
            kind: LlmErrorKind::NetworkError,
            message,
            status: None,
            retry_after: None,
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self {
            kind: LlmErrorKind::ParseError,
            message,
            status: None,
            retry_after: None,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }

    /// Delay before the next attempt: the provider's Retry-After if given,
    /// otherwise exponential backoff from one second, capped at 30 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(delay) = self.retry_after {
            return delay;
        }
        let secs = 1u64.checked_shl(attempt.min(5)).unwrap_or(32).min(30);
        Duration::from_secs(secs)
    }
}

/// Retry policy for transient LLM errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_retry_duration: Duration,
    pub retry_rate_limits: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
            retry_rate_limits: true,
        }
    }
}

impl RetryConfig {
    /// Never retry.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &LlmError) -> bool {
        if error.kind == LlmErrorKind::RateLimited && !self.retry_rate_limits {
            return false;
        }
        error.is_transient()
    }

    /// Delay before retrying after `error` failed the zero-based `attempt`,
    /// `elapsed` into the call. `None` when the error is permanent or the
    /// attempt or time budget is spent.
    pub fn next_delay(&self, error: &LlmError, attempt: u32, elapsed: Duration) -> Option<Duration> {
        if attempt >= self.max_retries || !self.should_retry(error) {
            return None;
        }
        let remaining = self.max_retry_duration.checked_sub(elapsed)?;
        let delay = error.suggested_delay(attempt).min(remaining);
        (!delay.is_zero()).then_some(delay)
    }
}
