//! # Fetch Mode
//!
//! Downloads the artifacts listed in a JSON manifest through the tiered HTTP
//! transports and writes them to the output directory. Individual download
//! failures are reported, not raised.

use crate::config::{FerryConfig, TransportSettings};
use crate::download::{
    ArtifactDownloadEngine, ArtifactRef, DownloadFailure, SandboxSession, TransportHint,
};
use crate::output::ArtifactWriter;
use crate::shell::cli::FetchArgs;
use anyhow::{Context, Result};
use ferry_common::transport::ArtifactTransport;
use ferry_http_client::client::HttpArtifactTransport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// A session as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRecord {
    pub id: String,
    #[serde(with = "crate::utils::time")]
    pub created_at: SystemTime,
    /// Falls back to `download.session_ttl_secs` when absent.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl SessionRecord {
    pub fn into_session(self, default_ttl: Duration) -> SandboxSession {
        let ttl = self.ttl_secs.map(Duration::from_secs).unwrap_or(default_ttl);
        SandboxSession::new(self.id, self.created_at, ttl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchManifest {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    pub artifacts: Vec<ArtifactRef>,
}

impl FetchManifest {
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let mut manifest: FetchManifest = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        for artifact in &mut manifest.artifacts {
            if artifact.transport_hint == TransportHint::Unknown {
                artifact.transport_hint = TransportHint::from_identifier(&artifact.id);
            }
        }
        Ok(manifest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenArtifact {
    pub artifact_id: String,
    /// `None` when the collision policy skipped the write.
    pub path: Option<PathBuf>,
    pub size_bytes: usize,
    pub attempts: u32,
    pub via_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchOutput {
    pub written: Vec<WrittenArtifact>,
    pub failed: Vec<DownloadFailure>,
}

/// Build the primary and optional fallback transports from configuration.
pub fn build_transports(
    settings: &TransportSettings,
    token: &str,
    request_timeout: Duration,
) -> Result<(Arc<dyn ArtifactTransport>, Option<Arc<dyn ArtifactTransport>>)> {
    let primary = HttpArtifactTransport::new(
        "primary",
        &settings.base_url,
        &settings.primary_path,
        token,
        request_timeout,
    )
    .context("Failed to build primary transport")?;

    let fallback = if settings.has_fallback() {
        let transport = HttpArtifactTransport::new(
            "fallback",
            &settings.base_url,
            &settings.fallback_path,
            token,
            request_timeout,
        )
        .context("Failed to build fallback transport")?;
        Some(Arc::new(transport) as Arc<dyn ArtifactTransport>)
    } else {
        None
    };

    Ok((Arc::new(primary), fallback))
}

/// Download everything in `manifest` and write the successes.
pub async fn fetch_artifacts(
    engine: &ArtifactDownloadEngine,
    manifest: FetchManifest,
    default_ttl: Duration,
    writer: &ArtifactWriter,
    cancel: CancellationToken,
) -> Result<FetchOutput> {
    let sessions: Vec<SandboxSession> = manifest
        .sessions
        .into_iter()
        .map(|record| record.into_session(default_ttl))
        .collect();

    let report = engine
        .retrieve_all(manifest.artifacts, &sessions, cancel)
        .await;

    let mut output = FetchOutput {
        written: Vec::with_capacity(report.succeeded.len()),
        failed: report.failed,
    };
    for artifact in &report.succeeded {
        let path = writer.write(artifact).await.with_context(|| {
            format!(
                "Failed to write artifact {} to {}",
                artifact.artifact_id,
                writer.dir().display()
            )
        })?;
        output.written.push(WrittenArtifact {
            artifact_id: artifact.artifact_id.clone(),
            path,
            size_bytes: artifact.size_bytes,
            attempts: artifact.attempts,
            via_fallback: artifact.via_fallback,
        });
    }
    Ok(output)
}

pub async fn run_fetch_mode(args: &FetchArgs, config: &FerryConfig) -> Result<()> {
    let manifest = FetchManifest::load(&args.manifest).await?;

    let token_env = &config.transport.token_env;
    let token = std::env::var(token_env)
        .with_context(|| format!("Environment variable {token_env} is not set"))?;

    let policy = config.download.to_policy();
    let (primary, fallback) =
        build_transports(&config.transport, &token, policy.request_timeout)?;
    let engine = ArtifactDownloadEngine::new(primary, fallback, policy);
    let writer = ArtifactWriter::new(&args.output_dir, args.on_collision);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; cancelling outstanding downloads");
            interrupt.cancel();
        }
    });

    let output = fetch_artifacts(
        &engine,
        manifest,
        config.download.session_ttl(),
        &writer,
        cancel,
    )
    .await?;

    let json = serde_json::to_string_pretty(&output).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}
