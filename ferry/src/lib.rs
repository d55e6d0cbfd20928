//! # Ferry Lib
//!
//! This crate provides the core functionality for the `ferry` CLI: routing local
//! attachments to prompt-generation destinations, and retrieving the artifacts a
//! hosted sandbox produces during a run.
//!
//! ## Modules
//!
//! - **`path_security`**: `PathSecurityValidator`, which confirms a path
//!   canonicalizes inside one of the allowed roots. Every file that reaches a
//!   destination has passed through it.
//!
//! - **`attachment`**: the route-expression parser (`alias=path`, `alias path`,
//!   `destinations:path`, globs and `@list` collections) and the resolver that
//!   expands `AttachmentSpec`s into de-duplicated, digest-stamped `ResolvedFile`s.
//!
//! - **`router`**: `DestinationRouter`, which groups resolved files into
//!   per-destination `UploadBatch`es and reports per-destination limit violations
//!   without dropping a file from destinations whose limits it satisfies.
//!
//! - **`download`**: the artifact download state machine and the engine that
//!   drives it with tiered transports, backoff, session-expiry checks, shared
//!   rate-limit backpressure and cancellation.
//!
//! - **`retry`**: backoff delay policy used by the download engine.
//!
//! - **`output`**: writes downloaded artifacts into an output directory with a
//!   collision policy.
//!
//! - **`config`**: the TOML configuration file (download policy, destination
//!   limits, transport endpoints).
//!
//! - **`constants`**: default numeric policy and endpoint templates.
//!
//! - **`shell`**: the `ferry` command-line entry point.
//!
//! - **`utils`**: logging initialization and time serialization helpers.

pub mod attachment;
pub mod config;
pub mod constants;
pub mod download;
pub mod output;
pub mod path_security;
pub mod retry;
pub mod router;
pub mod shell;
pub mod utils;

// Fakes and fixtures shared by unit and integration tests.
pub mod test_utils;
