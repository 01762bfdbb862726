//! Command-line interface definition for kiln.
//!
//! - `kiln dev` - dev middleware in front of an axum app, rebuilding in watch mode
//! - `kiln serve` - standalone static dev server
//! - `kiln run` - rebuild a target and restart its output as a child process
//! - `kiln check` - validate configuration

mod commands;
mod validation;

use std::path::PathBuf;

use clap::Parser;

pub use commands::{CheckArgs, Command, DevArgs, RunArgs, ServeArgs};
pub use validation::{parse_public_url, parse_target_name};

/// kiln - watch-mode development serving
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Watch-mode dev middleware, static dev server and process runner",
    long_about = "kiln runs your bundler in watch mode and serves its output.\n\
                  Requests wait until the first build has finished, so the browser\n\
                  never sees a half-written bundle."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to kiln.toml or package.json (default: discovered in the working directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
