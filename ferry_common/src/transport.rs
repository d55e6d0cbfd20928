//! Artifact transport contract.
//!
//! A transport retrieves the bytes of one sandbox-produced artifact. The core
//! never inspects how a transport talks to its backend; it only reacts to the
//! [`FailureClass`] of the errors a transport reports.

use async_trait::async_trait;
use std::time::Duration;

/// How the download state machine should react to a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The transport cannot serve this artifact class. Permanent for this transport.
    Unsupported,
    /// The backend reports the artifact does not exist. Permanent.
    NotFound,
    /// Timeouts, 5xx, 429 and connection failures. Retried on the same transport.
    Transient,
    /// Credential or request problems. Permanent.
    Rejected,
}

/// Errors reported by an [`ArtifactTransport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport cannot serve this artifact: {reason}")]
    Unsupported { reason: String },

    #[error("artifact not found")]
    NotFound,

    #[error("rate limited{}", format_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl TransportError {
    /// Classify this error for the retry state machine.
    pub fn class(&self) -> FailureClass {
        match self {
            TransportError::Unsupported { .. } => FailureClass::Unsupported,
            TransportError::NotFound => FailureClass::NotFound,
            TransportError::RateLimited { .. }
            | TransportError::Server { .. }
            | TransportError::Timeout
            | TransportError::Network(_) => FailureClass::Transient,
            TransportError::Rejected { .. } | TransportError::InvalidRequest(_) => {
                FailureClass::Rejected
            }
        }
    }

    /// Returns the server-requested wait when this is a rate-limit response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::RateLimited { .. })
    }
}

/// One way of retrieving artifact bytes from a sandbox session.
///
/// Implementations must not retry internally; retry, backoff and fallback
/// decisions belong to the caller.
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Fetch the full contents of `artifact_id` produced in `session_id`.
    async fn fetch(&self, session_id: &str, artifact_id: &str) -> Result<Vec<u8>, TransportError>;
}
