//! Download engine behaviour against scripted transports and simulated time.
//!
//! No test here sleeps for real: backoff goes through a `SimulatedClock`,
//! which records each requested delay and moves its own clock forward.

use async_trait::async_trait;
use ferry::download::{
    ArtifactDownloadEngine, ArtifactRef, DownloadErrorKind, DownloadPolicy, DownloadState,
    SandboxSession,
};
use ferry::retry::RetryConfig;
use ferry::test_utils::ScriptedTransport;
use ferry_common::backpressure::RateLimitSignal;
use ferry_common::clock::SimulatedClock;
use ferry_common::transport::{ArtifactTransport, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

fn start() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

fn policy(max_attempts: u32) -> DownloadPolicy {
    DownloadPolicy {
        max_attempts,
        backoff: RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_factor(2.0)
            .with_jitter(false),
        request_timeout: Duration::from_secs(5),
        concurrency: 1,
    }
}

fn fresh_session(id: &str) -> SandboxSession {
    SandboxSession::new(id, start(), Duration::from_secs(20 * 60))
}

fn engine(
    primary: &Arc<ScriptedTransport>,
    fallback: Option<&Arc<ScriptedTransport>>,
    policy: DownloadPolicy,
    clock: &Arc<SimulatedClock>,
) -> ArtifactDownloadEngine {
    let primary: Arc<dyn ArtifactTransport> = primary.clone();
    let fallback = fallback.map(|f| f.clone() as Arc<dyn ArtifactTransport>);
    ArtifactDownloadEngine::new(primary, fallback, policy).with_time(clock.clone(), clock.clone())
}

fn unsupported() -> TransportError {
    TransportError::Unsupported {
        reason: "files endpoint does not serve container files".to_string(),
    }
}

/// Test: an expired session fails without any network call
#[tokio::test]
async fn test_expired_session_short_circuits() {
    let clock = Arc::new(SimulatedClock::new(start() + Duration::from_secs(2 * 3600)));
    let primary = Arc::new(ScriptedTransport::serving("primary", b"data".to_vec()));
    let fallback = Arc::new(ScriptedTransport::serving("fallback", b"data".to_vec()));
    let engine = engine(&primary, Some(&fallback), policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "out.csv");
    let result = engine.retrieve(&artifact, &fresh_session("cntr_1")).await;

    assert_eq!(result, Err(DownloadErrorKind::Expired));
    assert_eq!(primary.calls(), 0);
    assert_eq!(fallback.calls(), 0);
}

/// Test: unsupported on the primary goes to the fallback once, without retrying the primary
#[tokio::test]
async fn test_unsupported_primary_uses_fallback_once() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing("primary", unsupported()));
    let fallback = Arc::new(ScriptedTransport::serving("fallback", vec![7u8; 1024]));
    let engine = engine(&primary, Some(&fallback), policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_abc", "cntr_1", "plot.png");
    let outcome = engine
        .run_task(
            &artifact,
            Some(&fresh_session("cntr_1")),
            &RateLimitSignal::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.task.state(), DownloadState::Succeeded);
    assert_eq!(outcome.task.fallback_attempts(), 1);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert!(
        clock.recorded_sleeps().is_empty(),
        "tier switch must not back off"
    );
    assert_eq!(outcome.into_result().unwrap().len(), 1024);
}

/// Test: the fallback is called with the session and artifact ids
#[tokio::test]
async fn test_fallback_receives_session_id() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing("primary", unsupported()));
    let fallback = Arc::new(ScriptedTransport::serving("fallback", b"ok".to_vec()));
    let engine = engine(&primary, Some(&fallback), policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_9", "cntr_42", "a.txt");
    engine
        .retrieve(&artifact, &fresh_session("cntr_42"))
        .await
        .unwrap();
    assert_eq!(
        fallback.requests(),
        vec![("cntr_42".to_string(), "cfile_9".to_string())]
    );
}

/// Test: unsupported on both tiers is a permanent failure
#[tokio::test]
async fn test_unsupported_on_both_tiers() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing("primary", unsupported()));
    let fallback = Arc::new(ScriptedTransport::failing("fallback", unsupported()));
    let engine = engine(&primary, Some(&fallback), policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let result = engine.retrieve(&artifact, &fresh_session("cntr_1")).await;
    assert_eq!(result, Err(DownloadErrorKind::TransportUnsupported));
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

/// Test: without a fallback, unsupported fails after one call
#[tokio::test]
async fn test_unsupported_without_fallback() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing("primary", unsupported()));
    let engine = engine(&primary, None, policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let result = engine.retrieve(&artifact, &fresh_session("cntr_1")).await;
    assert_eq!(result, Err(DownloadErrorKind::TransportUnsupported));
    assert_eq!(primary.calls(), 1);
}

/// Test: backoff delays never shrink and never pass the ceiling, even with jitter
#[tokio::test]
async fn test_backoff_non_decreasing_and_capped() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing(
        "primary",
        TransportError::Server { status: 503 },
    ));
    let mut policy = policy(8);
    policy.backoff = policy
        .backoff
        .with_max_delay(Duration::from_secs(1))
        .with_jitter(true);
    let engine = engine(&primary, None, policy, &clock);

    let artifact = ArtifactRef::new("file-1", "cntr_1", "x");
    let result = engine.retrieve(&artifact, &fresh_session("cntr_1")).await;
    assert_eq!(result, Err(DownloadErrorKind::Exhausted));
    assert_eq!(primary.calls(), 8);

    let sleeps = clock.recorded_sleeps();
    assert_eq!(sleeps.len(), 7, "one sleep between consecutive attempts");
    for pair in sleeps.windows(2) {
        assert!(pair[0] <= pair[1], "delays decreased: {sleeps:?}");
    }
    assert!(sleeps.iter().all(|d| *d <= Duration::from_secs(1)));
}

/// Test: transient errors are retried and never surface when a retry succeeds
#[tokio::test]
async fn test_transient_then_success() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::new(
        "primary",
        [
            Err(TransportError::Timeout),
            Err(TransportError::Network("connection reset".to_string())),
            Ok(b"payload".to_vec()),
        ],
    ));
    let engine = engine(&primary, None, policy(5), &clock);

    let artifact = ArtifactRef::new("file-1", "cntr_1", "x");
    let bytes = engine
        .retrieve(&artifact, &fresh_session("cntr_1"))
        .await
        .unwrap();
    assert_eq!(bytes, b"payload");
    assert_eq!(
        clock.recorded_sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

/// Test: a session that expires while backing off stops the retries
#[tokio::test]
async fn test_session_expires_during_backoff() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing(
        "primary",
        TransportError::Server { status: 502 },
    ));
    let mut policy = policy(10);
    policy.backoff = policy.backoff.with_initial_delay(Duration::from_millis(600));
    let engine = engine(&primary, None, policy, &clock);

    // 600ms then 1200ms of backoff passes the one-second lifetime.
    let session = SandboxSession::new("cntr_1", start(), Duration::from_secs(1));
    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let result = engine.retrieve(&artifact, &session).await;

    assert_eq!(result, Err(DownloadErrorKind::Expired));
    assert_eq!(primary.calls(), 2);
}

/// Test: an empty body counts as not found
#[tokio::test]
async fn test_empty_body_is_not_found() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::serving("primary", Vec::new()));
    let engine = engine(&primary, None, policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let result = engine.retrieve(&artifact, &fresh_session("cntr_1")).await;
    assert_eq!(result, Err(DownloadErrorKind::NotFound));
    assert_eq!(primary.calls(), 1);
}

/// Test: permanent errors do not consume retry budget
#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let cases = [
        (TransportError::NotFound, DownloadErrorKind::NotFound),
        (
            TransportError::Rejected {
                status: 401,
                message: "invalid key".to_string(),
            },
            DownloadErrorKind::Rejected,
        ),
    ];
    for (error, expected) in cases {
        let clock = Arc::new(SimulatedClock::new(start()));
        let primary = Arc::new(ScriptedTransport::failing("primary", error));
        let engine = engine(&primary, None, policy(5), &clock);

        let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
        let result = engine.retrieve(&artifact, &fresh_session("cntr_1")).await;
        assert_eq!(result, Err(expected));
        assert_eq!(primary.calls(), 1);
        assert!(clock.recorded_sleeps().is_empty());
    }
}

/// Test: a shared rate-limit floor holds back the next retry
#[tokio::test]
async fn test_retry_waits_for_shared_floor() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::new(
        "primary",
        [
            Err(TransportError::Server { status: 500 }),
            Ok(b"x".to_vec()),
        ],
    ));
    let engine = engine(&primary, None, policy(5), &clock);

    let signal = RateLimitSignal::new();
    signal.raise(Duration::from_secs(5), Duration::from_secs(30));

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let outcome = engine
        .run_task(
            &artifact,
            Some(&fresh_session("cntr_1")),
            &signal,
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.task.state(), DownloadState::Succeeded);
    assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(5)]);
}

/// Test: a 429 seen by one artifact slows the other artifacts of the same session
#[tokio::test]
async fn test_rate_limit_is_shared_within_session() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::new(
        "primary",
        [
            Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }),
            Ok(b"first".to_vec()),
            Err(TransportError::Server { status: 503 }),
            Ok(b"second".to_vec()),
        ],
    ));
    let engine = engine(&primary, None, policy(5), &clock);

    let artifacts = vec![
        ArtifactRef::new("cfile_1", "cntr_1", "a"),
        ArtifactRef::new("cfile_2", "cntr_1", "b"),
    ];
    let report = engine
        .retrieve_all(
            artifacts,
            &[fresh_session("cntr_1")],
            CancellationToken::new(),
        )
        .await;

    assert!(report.is_complete_success());
    // The second artifact's own backoff would be 100ms; the floor holds it at 2s.
    assert_eq!(
        clock.recorded_sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(2)]
    );
}

/// Test: artifacts of an unknown session fail as expired without a call
#[tokio::test]
async fn test_unknown_session_is_expired() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::serving("primary", b"x".to_vec()));
    let engine = engine(&primary, None, policy(5), &clock);

    let report = engine
        .retrieve_all(
            vec![ArtifactRef::new("cfile_1", "cntr_missing", "x")],
            &[fresh_session("cntr_1")],
            CancellationToken::new(),
        )
        .await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, DownloadErrorKind::Expired);
    assert_eq!(primary.calls(), 0);
}

/// Test: a cancelled batch ends every task as cancelled, not exhausted
#[tokio::test]
async fn test_cancelled_before_start() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::serving("primary", b"x".to_vec()));
    let engine = engine(&primary, None, policy(5), &clock);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine
        .retrieve_all(
            vec![
                ArtifactRef::new("cfile_1", "cntr_1", "a"),
                ArtifactRef::new("cfile_2", "cntr_1", "b"),
            ],
            &[fresh_session("cntr_1")],
            cancel,
        )
        .await;

    assert_eq!(report.failed.len(), 2);
    for failure in &report.failed {
        assert_eq!(failure.kind, DownloadErrorKind::Cancelled);
        assert_eq!(failure.state, DownloadState::Cancelled);
    }
    assert_eq!(primary.calls(), 0);
}

/// Cancels the batch from inside a request, then fails transiently.
struct CancellingTransport {
    cancel: CancellationToken,
    calls: AtomicU32,
}

#[async_trait]
impl ArtifactTransport for CancellingTransport {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn fetch(&self, _session_id: &str, _artifact_id: &str) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Err(TransportError::Server { status: 503 })
    }
}

/// Test: cancellation is observed between attempts
#[tokio::test]
async fn test_cancelled_between_attempts() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let cancel = CancellationToken::new();
    let primary = Arc::new(CancellingTransport {
        cancel: cancel.clone(),
        calls: AtomicU32::new(0),
    });
    let engine = ArtifactDownloadEngine::new(primary.clone(), None, policy(5))
        .with_time(clock.clone(), clock.clone());

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let outcome = engine
        .run_task(
            &artifact,
            Some(&fresh_session("cntr_1")),
            &RateLimitSignal::new(),
            &cancel,
        )
        .await;

    assert_eq!(outcome.task.state(), DownloadState::Cancelled);
    assert_eq!(outcome.task.attempt_count(), 1);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
}

/// Serves fixed responses per artifact id.
struct PerArtifactTransport {
    responses: HashMap<String, Result<Vec<u8>, TransportError>>,
}

#[async_trait]
impl ArtifactTransport for PerArtifactTransport {
    fn name(&self) -> &str {
        "per-artifact"
    }

    async fn fetch(&self, _session_id: &str, artifact_id: &str) -> Result<Vec<u8>, TransportError> {
        self.responses
            .get(artifact_id)
            .cloned()
            .unwrap_or(Err(TransportError::NotFound))
    }
}

/// Test: one failed artifact does not abort the batch
#[tokio::test]
async fn test_partial_success_is_reported() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(PerArtifactTransport {
        responses: HashMap::from([
            ("cfile_ok".to_string(), Ok(b"hello".to_vec())),
            ("cfile_gone".to_string(), Err(TransportError::NotFound)),
        ]),
    });
    let mut policy = policy(5);
    policy.concurrency = 4;
    let engine =
        ArtifactDownloadEngine::new(primary, None, policy).with_time(clock.clone(), clock.clone());

    let report = engine
        .retrieve_all(
            vec![
                ArtifactRef::new("cfile_ok", "cntr_1", "hello.txt"),
                ArtifactRef::new("cfile_gone", "cntr_1", "gone.txt"),
            ],
            &[fresh_session("cntr_1")],
            CancellationToken::new(),
        )
        .await;

    assert!(!report.is_complete_success());
    assert_eq!(report.succeeded.len(), 1);
    let ok = &report.succeeded[0];
    assert_eq!(ok.artifact_id, "cfile_ok");
    assert_eq!(ok.claimed_filename, "hello.txt");
    assert_eq!(ok.bytes, b"hello");
    assert_eq!(ok.attempts, 1);
    assert!(!ok.via_fallback);

    assert_eq!(report.failed.len(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.artifact_id, "cfile_gone");
    assert_eq!(failed.kind, DownloadErrorKind::NotFound);
    assert_eq!(failed.detail.as_deref(), Some("artifact not found"));
}

/// Never answers; the engine's request timeout must cut it off.
struct HangingTransport;

#[async_trait]
impl ArtifactTransport for HangingTransport {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn fetch(&self, _session_id: &str, _artifact_id: &str) -> Result<Vec<u8>, TransportError> {
        std::future::pending().await
    }
}

/// Test: a hung request times out and is retried as transient
#[tokio::test]
async fn test_request_timeout_is_transient() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let mut policy = policy(2);
    policy.request_timeout = Duration::from_millis(20);
    let engine = ArtifactDownloadEngine::new(Arc::new(HangingTransport), None, policy)
        .with_time(clock.clone(), clock.clone());

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let outcome = engine
        .run_task(
            &artifact,
            Some(&fresh_session("cntr_1")),
            &RateLimitSignal::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.task.state(), DownloadState::FailedExhausted);
    assert_eq!(outcome.task.attempt_count(), 2);
    assert_eq!(outcome.last_error, Some(TransportError::Timeout));
    // timeout, backoff, timeout
    assert_eq!(
        clock.recorded_sleeps(),
        vec![
            Duration::from_millis(20),
            Duration::from_millis(100),
            Duration::from_millis(20)
        ]
    );
}

/// Test: a slow request can outlive the session on simulated time
#[tokio::test]
async fn test_session_expires_while_request_hangs() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let mut policy = policy(5);
    policy.request_timeout = Duration::from_secs(2);
    let engine = ArtifactDownloadEngine::new(Arc::new(HangingTransport), None, policy)
        .with_time(clock.clone(), clock.clone());

    let session = SandboxSession::new("cntr_1", start(), Duration::from_secs(1));
    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "x");
    let result = engine.retrieve(&artifact, &session).await;

    assert_eq!(result, Err(DownloadErrorKind::Expired));
    assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(2), Duration::from_millis(100)]);
}

/// Test: a session that does not own the artifact is treated as expired
#[tokio::test]
async fn test_retrieve_with_foreign_session_is_expired() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::serving("primary", b"data".to_vec()));
    let engine = engine(&primary, None, policy(5), &clock);

    let artifact = ArtifactRef::new("cfile_1", "cntr_1", "out.csv");
    let result = engine.retrieve(&artifact, &fresh_session("cntr_other")).await;

    assert_eq!(result, Err(DownloadErrorKind::Expired));
    assert_eq!(primary.calls(), 0);
}

/// Test: with a one-attempt budget the fallback still gets its attempt
#[tokio::test]
async fn test_single_attempt_budget_still_reaches_fallback() {
    let clock = Arc::new(SimulatedClock::new(start()));
    let primary = Arc::new(ScriptedTransport::failing("primary", unsupported()));
    let fallback = Arc::new(ScriptedTransport::serving("fallback", vec![1u8; 1024]));
    let engine = engine(&primary, Some(&fallback), policy(1), &clock);

    let artifact = ArtifactRef::new("cfile_abc", "cntr_1", "plot.png");
    let bytes = engine
        .retrieve(&artifact, &fresh_session("cntr_1"))
        .await
        .unwrap();

    assert_eq!(bytes.len(), 1024);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}
