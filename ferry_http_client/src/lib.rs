//! # Ferry HTTP Client
//!
//! Raw-HTTP artifact retrieval for sandbox-generated files.
//!
//! The same [`client::HttpArtifactTransport`] serves both retrieval tiers:
//!
//! - **Files endpoint** (`/files/{artifact_id}/content`): the path the hosted
//!   API exposes natively. Some artifact classes cannot be served here.
//! - **Container endpoint** (`/containers/{session_id}/files/{artifact_id}/content`):
//!   talks to the sandbox's backing store directly and serves every artifact the
//!   sandbox produced, for as long as the sandbox is alive.
//!
//! Base URL, bearer credential and path templates are opaque to this crate; it
//! only substitutes the two identifiers and maps HTTP status codes onto
//! [`ferry_common::transport::TransportError`].
//!
//! ```no_run
//! use ferry_common::transport::ArtifactTransport;
//! use ferry_http_client::client::HttpArtifactTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpArtifactTransport::container_endpoint(
//!     "https://api.example.com/v1",
//!     "secret-token",
//!     Duration::from_secs(60),
//! )?;
//! let bytes = transport.fetch("cntr_123", "cfile_456").await?;
//! println!("downloaded {} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

/// HTTP transport implementation.
pub mod client;
/// Error types for transport construction.
pub mod error;
