//! kiln CLI library.
//!
//! The binary in `main.rs` is a thin wrapper; argument parsing, configuration
//! layering and the command bodies live here so they can be tested.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
