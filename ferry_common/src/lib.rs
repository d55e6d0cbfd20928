//! # Ferry Common
//!
//! Contracts shared between the `ferry` core and its transport crates.
//!
//! - **`transport`**: the [`transport::ArtifactTransport`] trait every artifact
//!   retrieval path implements, plus the [`transport::TransportError`] taxonomy
//!   the download engine reacts to.
//! - **`clock`**: the time seam (`Clock` + `Sleeper`) that lets retry loops run
//!   against simulated time in tests.
//! - **`backpressure`**: the per-session rate-limit signal shared by concurrent
//!   downloads.

pub mod backpressure;
pub mod clock;
pub mod transport;
