//! Default policy values.
//!
//! None of these are protocol guarantees; all of them can be overridden in the
//! configuration file.

use std::time::Duration;

/// Total network attempts per artifact, across both transport tiers.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Backoff ceiling. Also caps the shared rate-limit floor.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Per-request timeout. Must stay below [`DEFAULT_MAX_DELAY`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Concurrent artifact downloads per batch.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

/// Observed sandbox lifetime (about 20 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(20 * 60);

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the bearer credential for artifact downloads.
pub const DEFAULT_TOKEN_ENV: &str = "OPENAI_API_KEY";

pub const SANDBOX_MAX_FILES: usize = 20;
pub const SEARCH_MAX_FILES: usize = 10_000;

/// Per-file upload cap shared by the sandbox and search destinations.
pub const HOSTED_MAX_FILE_BYTES: u64 = 512 * 1024 * 1024;
