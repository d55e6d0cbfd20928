//! Drives [`DownloadTask`]s against real transports.
//!
//! One task per artifact, run concurrently through a bounded pool. Each task
//! owns its retry loop; the only state shared between tasks is the
//! [`RateLimitSignal`] of their session.

use super::task::{DownloadEvent, DownloadState, DownloadTask};
use super::types::{ArtifactRef, DownloadErrorKind, SandboxSession, TransportTier};
use crate::constants::{DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT};
use crate::retry::RetryConfig;
use ferry_common::backpressure::{RateLimitRegistry, RateLimitSignal};
use ferry_common::clock::{Clock, Sleeper, SystemClock};
use ferry_common::transport::{ArtifactTransport, TransportError};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Numeric policy for one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPolicy {
    /// Network attempts per artifact across both tiers.
    pub max_attempts: u32,
    pub backoff: RetryConfig,
    pub request_timeout: Duration,
    /// Artifacts downloaded at the same time.
    pub concurrency: usize,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: RetryConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }
}

/// Result of driving one task to a terminal state.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: DownloadTask,
    /// Present only when the task succeeded.
    pub bytes: Option<Vec<u8>>,
    /// The last transport error seen, for reporting.
    pub last_error: Option<TransportError>,
}

impl TaskOutcome {
    pub fn into_result(self) -> Result<Vec<u8>, DownloadErrorKind> {
        match (self.task.state(), self.bytes) {
            (DownloadState::Succeeded, Some(bytes)) => Ok(bytes),
            (state, _) => Err(state
                .error_kind()
                .or(self.task.last_error_kind())
                .unwrap_or(DownloadErrorKind::Exhausted)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedArtifact {
    pub artifact_id: String,
    pub session_id: String,
    pub claimed_filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size_bytes: usize,
    pub attempts: u32,
    pub via_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub artifact_id: String,
    pub session_id: String,
    pub claimed_filename: String,
    pub kind: DownloadErrorKind,
    pub state: DownloadState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-artifact results for one batch. Order is not meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub succeeded: Vec<DownloadedArtifact>,
    pub failed: Vec<DownloadFailure>,
}

impl DownloadReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, outcome: TaskOutcome) {
        let TaskOutcome {
            task,
            bytes,
            last_error,
        } = outcome;
        let artifact = task.artifact().clone();

        match (task.state(), bytes) {
            (DownloadState::Succeeded, Some(bytes)) => {
                self.succeeded.push(DownloadedArtifact {
                    artifact_id: artifact.id,
                    session_id: artifact.session_id,
                    claimed_filename: artifact.claimed_filename,
                    size_bytes: bytes.len(),
                    bytes,
                    attempts: task.attempt_count(),
                    via_fallback: task.fallback_attempts() > 0,
                });
            }
            (state, _) => {
                self.failed.push(DownloadFailure {
                    artifact_id: artifact.id,
                    session_id: artifact.session_id,
                    claimed_filename: artifact.claimed_filename,
                    kind: state
                        .error_kind()
                        .or(task.last_error_kind())
                        .unwrap_or(DownloadErrorKind::Exhausted),
                    state,
                    attempts: task.attempt_count(),
                    detail: last_error.map(|e| e.to_string()),
                });
            }
        }
    }
}

/// Retrieves artifacts through a primary transport and an optional fallback.
pub struct ArtifactDownloadEngine {
    primary: Arc<dyn ArtifactTransport>,
    fallback: Option<Arc<dyn ArtifactTransport>>,
    policy: DownloadPolicy,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl ArtifactDownloadEngine {
    pub fn new(
        primary: Arc<dyn ArtifactTransport>,
        fallback: Option<Arc<dyn ArtifactTransport>>,
        policy: DownloadPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            policy,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(SystemClock),
        }
    }

    /// Replace the time source, e.g. with a simulated clock in tests.
    pub fn with_time(mut self, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        self.clock = clock;
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &DownloadPolicy {
        &self.policy
    }

    fn transport(&self, tier: TransportTier) -> Option<&Arc<dyn ArtifactTransport>> {
        match tier {
            TransportTier::Primary => Some(&self.primary),
            TransportTier::Fallback => self.fallback.as_ref(),
        }
    }

    /// Retrieve one artifact with a private rate-limit signal and no
    /// cancellation.
    ///
    /// A session other than the artifact's own cannot vouch for its lifetime,
    /// so the artifact fails as expired without a network call.
    pub async fn retrieve(
        &self,
        artifact: &ArtifactRef,
        session: &SandboxSession,
    ) -> Result<Vec<u8>, DownloadErrorKind> {
        let signal = RateLimitSignal::new();
        let cancel = CancellationToken::new();
        let session = (session.id == artifact.session_id).then_some(session);
        self.run_task(artifact, session, &signal, &cancel)
            .await
            .into_result()
    }

    /// Retrieve every artifact. Failures are collected, never propagated.
    ///
    /// Artifacts whose session is not in `sessions` fail as expired without
    /// a network call.
    pub async fn retrieve_all(
        &self,
        artifacts: Vec<ArtifactRef>,
        sessions: &[SandboxSession],
        cancel: CancellationToken,
    ) -> DownloadReport {
        let sessions: HashMap<&str, &SandboxSession> =
            sessions.iter().map(|s| (s.id.as_str(), s)).collect();
        let registry = RateLimitRegistry::new();
        let concurrency = self.policy.concurrency.max(1);

        info!(
            "Retrieving {} artifact(s), {} at a time",
            artifacts.len(),
            concurrency
        );

        let sessions = &sessions;
        let registry = &registry;
        let cancel = &cancel;
        let outcomes: Vec<TaskOutcome> = futures::stream::iter(artifacts)
            .map(|artifact| async move {
                let session = sessions.get(artifact.session_id.as_str()).copied();
                let signal = registry.signal_for(&artifact.session_id);
                self.run_task(&artifact, session, &signal, cancel).await
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = DownloadReport::default();
        for outcome in outcomes {
            report.record(outcome);
        }
        info!(
            "Retrieval finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    /// Drive one task to a terminal state.
    ///
    /// Expiry and cancellation are checked before every attempt. Backoff
    /// sleeps end early on cancellation; in-flight requests are not
    /// interrupted.
    pub async fn run_task(
        &self,
        artifact: &ArtifactRef,
        session: Option<&SandboxSession>,
        signal: &RateLimitSignal,
        cancel: &CancellationToken,
    ) -> TaskOutcome {
        let mut task = DownloadTask::new(
            artifact.clone(),
            self.policy.max_attempts,
            self.fallback.is_some(),
        );
        let mut bytes = None;
        let mut last_error = None;
        let mut retries: u32 = 0;
        let mut previous_delay = Duration::ZERO;

        debug!(
            "Artifact {} (hint {:?}) in session {}",
            artifact.id, artifact.transport_hint, artifact.session_id
        );
        task.advance(DownloadEvent::Begin);

        while !task.state().is_terminal() {
            if cancel.is_cancelled() {
                task.advance(DownloadEvent::CancelRequested);
                break;
            }
            let Some(session) = session
                .filter(|s| s.id == artifact.session_id && !s.is_expired_at(self.clock.now()))
            else {
                warn!(
                    "Session {} expired or unknown; not fetching {}",
                    artifact.session_id, artifact.id
                );
                task.advance(DownloadEvent::SessionExpired);
                break;
            };
            let Some(tier) = task.state().tier() else {
                break;
            };

            let state_before = task.state();
            let result = self.attempt(tier, &session.id, &artifact.id).await;
            match result {
                Ok(body) => {
                    let len = body.len();
                    if task.advance(DownloadEvent::Received { len }) == DownloadState::Succeeded {
                        debug!(
                            "Fetched {} ({} bytes) via {} after {} attempt(s)",
                            artifact.id,
                            len,
                            tier,
                            task.attempt_count()
                        );
                        bytes = Some(body);
                    }
                }
                Err(err) => {
                    debug!(
                        "Attempt {} for {} via {} failed: {}",
                        task.attempt_count() + 1,
                        artifact.id,
                        tier,
                        err
                    );
                    if err.is_rate_limited() {
                        let candidate = self
                            .policy
                            .backoff
                            .delay_for_attempt(retries)
                            .max(err.retry_after().unwrap_or_default());
                        let floor = signal.raise(candidate, self.policy.backoff.max_delay);
                        warn!("Rate limited on session {}; backoff floor now {:?}", session.id, floor);
                    }
                    let state = task.advance(DownloadEvent::Failed(err.class()));
                    if state == DownloadState::TryingFallback && state_before != state {
                        warn!(
                            "Primary transport cannot serve {} ({}); switching to fallback",
                            artifact.id, err
                        );
                    }
                    last_error = Some(err);

                    // Same tier again means a transient retry; a tier switch
                    // happens immediately.
                    if state == state_before {
                        let delay =
                            self.policy
                                .backoff
                                .next_delay(retries, previous_delay, signal.floor());
                        retries += 1;
                        previous_delay = delay;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                task.advance(DownloadEvent::CancelRequested);
                            }
                            _ = self.sleeper.sleep(delay) => {}
                        }
                    }
                }
            }
        }

        if let Some(kind) = task.state().error_kind() {
            error!(
                "Artifact {} ended {:?} ({}) after {} attempt(s)",
                artifact.id,
                task.state(),
                kind,
                task.attempt_count()
            );
        }

        TaskOutcome {
            task,
            bytes,
            last_error,
        }
    }

    async fn attempt(
        &self,
        tier: TransportTier,
        session_id: &str,
        artifact_id: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let Some(transport) = self.transport(tier) else {
            return Err(TransportError::Unsupported {
                reason: format!("no {tier} transport configured"),
            });
        };
        // Timed on the injected sleeper, not tokio::time.
        tokio::select! {
            biased;
            result = transport.fetch(session_id, artifact_id) => result,
            _ = self.sleeper.sleep(self.policy.request_timeout) => Err(TransportError::Timeout),
        }
    }
}
