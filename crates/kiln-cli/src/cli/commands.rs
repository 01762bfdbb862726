use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::validation::{parse_public_url, parse_target_name};

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a target's build output through the dev middleware
    ///
    /// Starts the bundler in watch mode on the first request. Requests wait
    /// until a build has finished, then get files straight from the build
    /// directory. Anything not found there falls through to the first
    /// content base, or a 404.
    Dev(DevArgs),

    /// Start the standalone static dev server
    ///
    /// Serves one or more directories with optional SPA fallback and HTTPS.
    /// Flags override the [serve] section of the configuration.
    Serve(ServeArgs),

    /// Rebuild a target in watch mode and restart its entry after every build
    Run(RunArgs),

    /// Validate the configuration and list targets
    Check(CheckArgs),
}

/// Arguments for the dev command
#[derive(Args, Debug)]
pub struct DevArgs {
    /// Target to build in watch mode
    #[arg(value_name = "TARGET", value_parser = parse_target_name)]
    pub target: String,

    /// Target whose build directory is served (defaults to TARGET)
    #[arg(long, value_name = "TARGET", value_parser = parse_target_name)]
    pub serve: Option<String>,

    /// Host to bind
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Fail waiting requests when a build fails instead of waiting for a good build
    #[arg(long)]
    pub fail_fast: bool,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory to serve; repeat to search several in order
    #[arg(short = 'd', long = "content-base", value_name = "DIR")]
    pub content_base: Vec<PathBuf>,

    /// Host to bind
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Serve the fallback file for unknown paths (single-page apps)
    #[arg(long)]
    pub spa: bool,

    /// Fallback file used with --spa
    #[arg(long, value_name = "FILE", requires = "spa")]
    pub fallback: Option<PathBuf>,

    /// Open the browser once the server is listening
    #[arg(long)]
    pub open: bool,

    /// TLS certificate (PEM)
    #[arg(long, value_name = "FILE", requires = "key")]
    pub cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, value_name = "FILE", requires = "cert")]
    pub key: Option<PathBuf>,

    /// Public URL to announce when the server sits behind a proxy
    #[arg(long, value_name = "URL", value_parser = parse_public_url)]
    pub proxied: Option<String>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target to build and run
    #[arg(value_name = "TARGET", value_parser = parse_target_name)]
    pub target: String,

    /// Interpreter used to start the built file
    #[arg(long, value_name = "PROGRAM")]
    pub interpreter: Option<String>,

    /// Start with the debugger listening
    #[arg(long)]
    pub inspect: bool,

    /// Start with the debugger listening and break before the first line
    #[arg(long, conflicts_with = "inspect")]
    pub inspect_brk: bool,

    /// Debugger port
    #[arg(long, value_name = "PORT")]
    pub inspect_port: Option<u16>,

    /// Run under ndb instead of the interpreter (needs --inspect or --inspect-brk)
    #[arg(long)]
    pub ndb: bool,

    /// Fail fast on build errors
    #[arg(long)]
    pub fail_fast: bool,

    /// Arguments passed to the program
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only check the schema; skip filesystem checks
    #[arg(long)]
    pub no_fs: bool,
}
