use serde::Serialize;

/// Failure reported by a generation provider.
///
/// The variant is the category the orchestrator's retry policy matches on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Transient failure (rate limit, network, 5xx). Safe to retry as-is.
    #[error("retryable provider error: {0}")]
    Retryable(String),

    /// The provider refused the prompt, usually a content-safety filter.
    /// Retrying with a simplified prompt may succeed.
    #[error("provider rejected the request: {0}")]
    ContentRejected(String),

    /// The call succeeded but produced nothing usable.
    #[error("provider returned no output: {0}")]
    NoOutput(String),

    /// Misconfiguration or a permanent refusal. Never retried.
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

/// Coarse category, for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Retryable,
    ContentRejected,
    NoOutput,
    Fatal,
}

impl ProviderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Retryable(_) => ErrorCategory::Retryable,
            ProviderError::ContentRejected(_) => ErrorCategory::ContentRejected,
            ProviderError::NoOutput(_) => ErrorCategory::NoOutput,
            ProviderError::Fatal(_) => ErrorCategory::Fatal,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Fatal(_))
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Retryable(format!("I/O error: {err}"))
    }
}
