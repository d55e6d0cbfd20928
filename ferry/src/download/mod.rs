//! Reliable retrieval of sandbox-produced artifacts.
//!
//! [`task`] holds the pure state machine, [`engine`] runs it against the
//! configured transports.

pub mod engine;
pub mod task;
pub mod types;

pub use engine::{
    ArtifactDownloadEngine, DownloadFailure, DownloadPolicy, DownloadReport, DownloadedArtifact,
    TaskOutcome,
};
pub use task::{DownloadEvent, DownloadState, DownloadTask, TransitionContext, transition};
pub use types::{ArtifactRef, DownloadErrorKind, SandboxSession, TransportHint, TransportTier};
