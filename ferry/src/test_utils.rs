//! Test helper utilities for ferry.
//!
//! Scripted transports for driving the download engine without a network,
//! and small filesystem fixtures for attachment resolution tests. These APIs
//! are intended for test-only code paths.

use async_trait::async_trait;
use ferry_common::transport::{ArtifactTransport, TransportError};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// A transport that replays a fixed script of responses.
///
/// Each call pops the next response; once only one is left it is repeated
/// forever. An empty script answers every call with `NotFound`.
#[derive(Debug)]
pub struct ScriptedTransport {
    name: String,
    script: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    calls: AtomicU32,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn new(
        name: impl Into<String>,
        script: impl IntoIterator<Item = Result<Vec<u8>, TransportError>>,
    ) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `bytes`.
    pub fn serving(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, [Ok(bytes.into())])
    }

    /// Always answers with `error`.
    pub fn failing(name: impl Into<String>, error: TransportError) -> Self {
        Self::new(name, [Err(error)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(session_id, artifact_id)` of every call, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ArtifactTransport for ScriptedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, session_id: &str, artifact_id: &str) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session_id.to_string(), artifact_id.to_string()));

        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match script.len() {
            0 => Err(TransportError::NotFound),
            1 => script[0].clone(),
            _ => script.pop_front().unwrap_or(Err(TransportError::NotFound)),
        }
    }
}

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Create each `(relative, contents)` pair under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) -> std::io::Result<()> {
    for (relative, contents) in files {
        write_file(root, relative, contents.as_bytes())?;
    }
    Ok(())
}

/// File names (not paths) of `paths`, for order-insensitive assertions.
pub fn file_names<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<String> {
    let mut names: Vec<String> = paths
        .into_iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
