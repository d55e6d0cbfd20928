//! # Modes
//!
//! One module per `ferry` subcommand.

pub mod fetch;
pub mod plan;

pub use fetch::run_fetch_mode;
pub use plan::run_plan_mode;
