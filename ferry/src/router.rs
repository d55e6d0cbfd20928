//! Per-destination grouping and limit enforcement.
//!
//! Each destination is evaluated on its own. A file that breaks a limit of
//! one destination is excluded from that destination only, and the exclusion
//! is reported as a [`LimitViolation`].

use crate::attachment::{Destination, ResolvedFile};
use crate::constants::{HOSTED_MAX_FILE_BYTES, SANDBOX_MAX_FILES, SEARCH_MAX_FILES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Caps for a single destination. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationLimits {
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub max_total_bytes: Option<u64>,
    #[serde(default)]
    pub max_file_bytes: Option<u64>,
}

impl DestinationLimits {
    pub const UNLIMITED: DestinationLimits = DestinationLimits {
        max_files: None,
        max_total_bytes: None,
        max_file_bytes: None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingLimits {
    #[serde(default)]
    pub template: DestinationLimits,
    #[serde(default = "default_sandbox_limits", rename = "sandbox-exec")]
    pub sandbox_exec: DestinationLimits,
    #[serde(default = "default_search_limits")]
    pub search: DestinationLimits,
}

fn default_sandbox_limits() -> DestinationLimits {
    DestinationLimits {
        max_files: Some(SANDBOX_MAX_FILES),
        max_total_bytes: None,
        max_file_bytes: Some(HOSTED_MAX_FILE_BYTES),
    }
}

fn default_search_limits() -> DestinationLimits {
    DestinationLimits {
        max_files: Some(SEARCH_MAX_FILES),
        max_total_bytes: None,
        max_file_bytes: Some(HOSTED_MAX_FILE_BYTES),
    }
}

impl Default for RoutingLimits {
    fn default() -> Self {
        Self {
            template: DestinationLimits::UNLIMITED,
            sandbox_exec: default_sandbox_limits(),
            search: default_search_limits(),
        }
    }
}

impl RoutingLimits {
    pub fn for_destination(&self, destination: Destination) -> DestinationLimits {
        match destination {
            Destination::TemplateContext => self.template,
            Destination::SandboxExec => self.sandbox_exec,
            Destination::SearchIndex => self.search,
        }
    }
}

/// Files accepted for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadBatch {
    pub destination: Destination,
    pub limits: DestinationLimits,
    pub files: Vec<ResolvedFile>,
    pub total_bytes: u64,
}

impl UploadBatch {
    fn new(destination: Destination, limits: DestinationLimits) -> Self {
        Self {
            destination,
            limits,
            files: Vec::new(),
            total_bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    FileSize,
    FileCount,
    AggregateSize,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LimitKind::FileSize => "per-file size limit",
            LimitKind::FileCount => "file count limit",
            LimitKind::AggregateSize => "aggregate size limit",
        };
        f.write_str(s)
    }
}

/// A file excluded from one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitViolation {
    pub destination: Destination,
    pub alias: String,
    pub path: PathBuf,
    pub kind: LimitKind,
    pub limit: u64,
    pub actual: u64,
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: '{}' ({}) exceeds the {} ({} > {})",
            self.destination,
            self.path.display(),
            self.alias,
            self.kind,
            self.actual,
            self.limit
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} destination limit violation(s): {}", .violations.len(), describe(.violations))]
pub struct LimitExceeded {
    pub violations: Vec<LimitViolation>,
}

fn describe(violations: &[LimitViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LimitExceeded {
    /// Violations for a single destination.
    pub fn for_destination(&self, destination: Destination) -> impl Iterator<Item = &LimitViolation> {
        self.violations
            .iter()
            .filter(move |v| v.destination == destination)
    }
}

/// Routing result: accepted batches plus everything that was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutePlan {
    pub batches: BTreeMap<Destination, UploadBatch>,
    pub violations: Vec<LimitViolation>,
}

impl RoutePlan {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// All-or-nothing: any violation is an error.
    pub fn into_batches_strict(self) -> Result<BTreeMap<Destination, UploadBatch>, LimitExceeded> {
        if self.violations.is_empty() {
            Ok(self.batches)
        } else {
            Err(LimitExceeded {
                violations: self.violations,
            })
        }
    }

    /// Reduced routing: keep what fits and hand back the violations.
    pub fn into_reduced(self) -> (BTreeMap<Destination, UploadBatch>, Option<LimitExceeded>) {
        let exceeded = (!self.violations.is_empty()).then_some(LimitExceeded {
            violations: self.violations,
        });
        (self.batches, exceeded)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DestinationRouter {
    limits: RoutingLimits,
}

impl DestinationRouter {
    pub fn new(limits: RoutingLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RoutingLimits {
        &self.limits
    }

    /// Group files per destination and apply limits in input order.
    ///
    /// Destinations with no routed files get no batch.
    pub fn plan(&self, files: &[ResolvedFile]) -> RoutePlan {
        let mut batches = BTreeMap::new();
        let mut violations = Vec::new();

        for destination in Destination::ALL {
            let routed: Vec<&ResolvedFile> =
                files.iter().filter(|f| f.is_routed_to(destination)).collect();
            if routed.is_empty() {
                continue;
            }

            let limits = self.limits.for_destination(destination);
            let mut batch = UploadBatch::new(destination, limits);
            for file in routed {
                match check_limits(&limits, &batch, file) {
                    None => {
                        batch.total_bytes += file.size_bytes();
                        batch.files.push(file.clone());
                    }
                    Some((kind, limit, actual)) => {
                        warn!(
                            "Excluding '{}' from {}: {} exceeded",
                            file.path().display(),
                            destination,
                            kind
                        );
                        violations.push(LimitViolation {
                            destination,
                            alias: file.alias().to_string(),
                            path: file.path().to_path_buf(),
                            kind,
                            limit,
                            actual,
                        });
                    }
                }
            }
            debug!(
                "Destination {}: {} file(s), {} bytes",
                destination,
                batch.len(),
                batch.total_bytes
            );
            batches.insert(destination, batch);
        }

        RoutePlan {
            batches,
            violations,
        }
    }

    /// Route strictly: any limit violation fails the whole route.
    pub fn route(
        &self,
        files: &[ResolvedFile],
    ) -> Result<BTreeMap<Destination, UploadBatch>, LimitExceeded> {
        self.plan(files).into_batches_strict()
    }
}

/// The first limit `file` would break if added to `batch`.
fn check_limits(
    limits: &DestinationLimits,
    batch: &UploadBatch,
    file: &ResolvedFile,
) -> Option<(LimitKind, u64, u64)> {
    let size = file.size_bytes();
    if let Some(max) = limits.max_file_bytes
        && size > max
    {
        return Some((LimitKind::FileSize, max, size));
    }
    if let Some(max) = limits.max_files
        && batch.files.len() >= max
    {
        return Some((LimitKind::FileCount, max as u64, batch.files.len() as u64 + 1));
    }
    if let Some(max) = limits.max_total_bytes {
        let total = batch.total_bytes.saturating_add(size);
        if total > max {
            return Some((LimitKind::AggregateSize, max, total));
        }
    }
    None
}
