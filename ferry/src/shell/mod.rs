//! # Shell Module
//!
//! Entry point and command-line handling for the `ferry` binary.
//!
//! ## Sub-modules
//!
//! - **`cli`**: argument parsing, logging and configuration setup, subcommand dispatch
//! - **`modes`**: the `plan` and `fetch` subcommands

pub mod cli;
pub mod modes;

pub use cli::{Cli, Command, FetchArgs, PlanArgs, run};
