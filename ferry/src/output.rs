//! Writing downloaded artifacts to disk.
//!
//! The remote side chooses `claimed_filename`, so only its final path
//! component is used and the result always lands directly inside the output
//! directory.

use crate::download::DownloadedArtifact;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    Overwrite,
    /// Write `name (1).ext`, `name (2).ext`, ... instead.
    #[default]
    Rename,
    Skip,
}

/// Upper bound on `name (n).ext` candidates before giving up.
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    policy: CollisionPolicy,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one artifact. Returns the path written, or `None` when skipped.
    pub async fn write(&self, artifact: &DownloadedArtifact) -> std::io::Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = safe_file_name(&artifact.claimed_filename, &artifact.artifact_id);
        let target = self.dir.join(&name);

        let written = match self.policy {
            CollisionPolicy::Overwrite => {
                tokio::fs::write(&target, &artifact.bytes).await?;
                Some(target)
            }
            CollisionPolicy::Skip => match create_new(&target, &artifact.bytes).await {
                Ok(()) => Some(target),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    info!("Skipping {}: '{}' already exists", artifact.artifact_id, target.display());
                    None
                }
                Err(e) => return Err(e),
            },
            CollisionPolicy::Rename => Some(self.write_renamed(&name, &artifact.bytes).await?),
        };

        if let Some(path) = &written {
            debug!(
                "Wrote {} ({} bytes) to {}",
                artifact.artifact_id,
                artifact.bytes.len(),
                path.display()
            );
        }
        Ok(written)
    }

    async fn write_renamed(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let (stem, ext) = split_name(name);
        for n in 0..MAX_RENAME_ATTEMPTS {
            let candidate = if n == 0 {
                name.to_string()
            } else {
                format!("{stem} ({n}){ext}")
            };
            let target = self.dir.join(candidate);
            match create_new(&target, bytes).await {
                Ok(()) => return Ok(target),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free name for '{name}' in {}", self.dir.display()),
        ))
    }
}

async fn create_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// The final path component of `claimed`, or `artifact-<id>` when nothing
/// usable is left.
pub fn safe_file_name(claimed: &str, artifact_id: &str) -> String {
    let last = claimed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let usable = !last.is_empty()
        && last != "."
        && last != ".."
        && !last.chars().any(|c| c.is_control() || c == ':');
    if usable {
        last.to_string()
    } else {
        let id: String = artifact_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("artifact-{id}")
    }
}

/// Split `name` into stem and extension (with its dot). Dotfiles have no extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => name.split_at(i),
    }
}
