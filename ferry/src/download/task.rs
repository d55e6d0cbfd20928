//! The per-artifact download state machine.
//!
//! [`transition`] is a pure function of `(state, event, context)`. The engine
//! performs I/O and feeds the outcome back in as a [`DownloadEvent`];
//! [`DownloadTask`] keeps the counters around it.
//!
//! ```text
//! Pending ──Begin──▶ TryingPrimary ──Unsupported──▶ TryingFallback
//!                        │  ▲ Transient                 │  ▲ Transient
//!                        └──┘                           └──┘
//! any non-terminal ──SessionExpired──▶ FailedExpired
//! any non-terminal ──CancelRequested──▶ Cancelled
//! ```

use super::types::{ArtifactRef, DownloadErrorKind, TransportTier};
use ferry_common::transport::FailureClass;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Pending,
    TryingPrimary,
    TryingFallback,
    Succeeded,
    FailedExpired,
    FailedNotFound,
    FailedUnsupported,
    FailedRejected,
    FailedExhausted,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            DownloadState::Pending | DownloadState::TryingPrimary | DownloadState::TryingFallback
        )
    }

    /// The transport tier an attempt in this state uses.
    pub fn tier(self) -> Option<TransportTier> {
        match self {
            DownloadState::TryingPrimary => Some(TransportTier::Primary),
            DownloadState::TryingFallback => Some(TransportTier::Fallback),
            _ => None,
        }
    }

    /// The error kind a failed terminal state reports.
    pub fn error_kind(self) -> Option<DownloadErrorKind> {
        match self {
            DownloadState::FailedExpired => Some(DownloadErrorKind::Expired),
            DownloadState::FailedNotFound => Some(DownloadErrorKind::NotFound),
            DownloadState::FailedUnsupported => Some(DownloadErrorKind::TransportUnsupported),
            DownloadState::FailedRejected => Some(DownloadErrorKind::Rejected),
            DownloadState::FailedExhausted => Some(DownloadErrorKind::Exhausted),
            DownloadState::Cancelled => Some(DownloadErrorKind::Cancelled),
            DownloadState::Pending
            | DownloadState::TryingPrimary
            | DownloadState::TryingFallback
            | DownloadState::Succeeded => None,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    Begin,
    SessionExpired,
    CancelRequested,
    /// A transport returned a body of `len` bytes.
    Received { len: usize },
    Failed(FailureClass),
}

impl DownloadEvent {
    /// True for events that consume one network attempt.
    pub fn is_attempt(self) -> bool {
        matches!(self, DownloadEvent::Received { .. } | DownloadEvent::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    /// Attempts made so far, including the one that produced the event.
    pub attempts: u32,
    pub max_attempts: u32,
    pub fallback_available: bool,
}

impl TransitionContext {
    fn budget_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Compute the next state. Terminal states never change.
pub fn transition(
    state: DownloadState,
    event: DownloadEvent,
    ctx: TransitionContext,
) -> DownloadState {
    use DownloadEvent as E;
    use DownloadState as S;

    if state.is_terminal() {
        return state;
    }

    match (state, event) {
        (_, E::SessionExpired) => S::FailedExpired,
        (_, E::CancelRequested) => S::Cancelled,

        (S::Pending, E::Begin) => S::TryingPrimary,
        (S::Pending, _) => S::Pending,
        (trying, E::Begin) => trying,

        (_, E::Received { len: 0 }) => S::FailedNotFound,
        (_, E::Received { .. }) => S::Succeeded,

        (_, E::Failed(FailureClass::NotFound)) => S::FailedNotFound,
        (_, E::Failed(FailureClass::Rejected)) => S::FailedRejected,

        // The fallback always gets one attempt, even when the primary used
        // up the budget.
        (S::TryingPrimary, E::Failed(FailureClass::Unsupported)) => {
            if ctx.fallback_available {
                S::TryingFallback
            } else {
                S::FailedUnsupported
            }
        }
        (_, E::Failed(FailureClass::Unsupported)) => S::FailedUnsupported,

        (trying, E::Failed(FailureClass::Transient)) => {
            if ctx.budget_left() {
                trying
            } else {
                S::FailedExhausted
            }
        }
    }
}

/// Mutable wrapper around one artifact's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    artifact: ArtifactRef,
    state: DownloadState,
    attempt_count: u32,
    fallback_attempts: u32,
    last_error_kind: Option<DownloadErrorKind>,
    max_attempts: u32,
    fallback_available: bool,
}

impl DownloadTask {
    pub fn new(artifact: ArtifactRef, max_attempts: u32, fallback_available: bool) -> Self {
        Self {
            artifact,
            state: DownloadState::Pending,
            attempt_count: 0,
            fallback_attempts: 0,
            last_error_kind: None,
            max_attempts,
            fallback_available,
        }
    }

    pub fn artifact(&self) -> &ArtifactRef {
        &self.artifact
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Network attempts made across both tiers.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn fallback_attempts(&self) -> u32 {
        self.fallback_attempts
    }

    pub fn last_error_kind(&self) -> Option<DownloadErrorKind> {
        self.last_error_kind
    }

    /// Apply `event`. A no-op once the task is terminal.
    pub fn advance(&mut self, event: DownloadEvent) -> DownloadState {
        if self.state.is_terminal() {
            return self.state;
        }

        if event.is_attempt() {
            self.attempt_count += 1;
            if self.state == DownloadState::TryingFallback {
                self.fallback_attempts += 1;
            }
        }

        let ctx = TransitionContext {
            attempts: self.attempt_count,
            max_attempts: self.max_attempts,
            fallback_available: self.fallback_available,
        };
        let next = transition(self.state, event, ctx);

        match event {
            DownloadEvent::Failed(class) => self.last_error_kind = Some(class.into()),
            DownloadEvent::Received { len: 0 } => {
                self.last_error_kind = Some(DownloadErrorKind::NotFound)
            }
            _ => {}
        }
        if let Some(kind) = next.error_kind() {
            self.last_error_kind = Some(kind);
        }

        self.state = next;
        next
    }
}
