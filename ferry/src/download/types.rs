use crate::constants::DEFAULT_SESSION_TTL;
use ferry_common::transport::FailureClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// One ephemeral remote execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSession {
    pub id: String,
    #[serde(with = "crate::utils::time")]
    pub created_at: SystemTime,
    #[serde(with = "crate::utils::time::secs")]
    pub ttl: Duration,
}

impl SandboxSession {
    pub fn new(id: impl Into<String>, created_at: SystemTime, ttl: Duration) -> Self {
        Self {
            id: id.into(),
            created_at,
            ttl,
        }
    }

    /// A session created now with the default lifetime.
    pub fn started_now(id: impl Into<String>) -> Self {
        Self::new(id, SystemTime::now(), DEFAULT_SESSION_TTL)
    }

    /// `now - created_at > ttl`. A clock behind `created_at` counts as fresh.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now.duration_since(self.created_at)
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn remaining_at(&self, now: SystemTime) -> Duration {
        let age = now.duration_since(self.created_at).unwrap_or_default();
        self.ttl.saturating_sub(age)
    }
}

/// Which transport an artifact id suggests. Informational only: the primary
/// transport is always tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportHint {
    Sdk,
    RawHttp,
    #[default]
    Unknown,
}

impl TransportHint {
    pub fn from_identifier(id: &str) -> Self {
        if id.starts_with("cfile_") {
            TransportHint::RawHttp
        } else if id.starts_with("file-") {
            TransportHint::Sdk
        } else {
            TransportHint::Unknown
        }
    }
}

/// A pointer to a file produced inside a sandbox session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub claimed_filename: String,
    #[serde(default)]
    pub transport_hint: TransportHint,
}

impl ArtifactRef {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        claimed_filename: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let transport_hint = TransportHint::from_identifier(&id);
        Self {
            id,
            session_id: session_id.into(),
            claimed_filename: claimed_filename.into(),
            transport_hint,
        }
    }
}

/// Why one artifact could not be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorKind {
    #[error("sandbox session expired")]
    Expired,
    #[error("artifact not found")]
    NotFound,
    #[error("no transport can serve this artifact")]
    TransportUnsupported,
    #[error("transient transport failure")]
    Transient,
    #[error("retry budget exhausted")]
    Exhausted,
    #[error("download cancelled")]
    Cancelled,
    #[error("request rejected by the backend")]
    Rejected,
}

impl From<FailureClass> for DownloadErrorKind {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Unsupported => DownloadErrorKind::TransportUnsupported,
            FailureClass::NotFound => DownloadErrorKind::NotFound,
            FailureClass::Transient => DownloadErrorKind::Transient,
            FailureClass::Rejected => DownloadErrorKind::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportTier {
    Primary,
    Fallback,
}

impl fmt::Display for TransportTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportTier::Primary => f.write_str("primary"),
            TransportTier::Fallback => f.write_str("fallback"),
        }
    }
}
