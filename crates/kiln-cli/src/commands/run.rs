//! Run command: rebuild a target on change and restart its entry.
//!
//! The process is started after the first successful build and restarted
//! after every later one. Failed builds leave the previous process running.

use std::path::Path;
use std::sync::Arc;

use kiln_config::validate;
use kiln_dev::{CommandBundler, ReadinessRegistry, SignalRegistry, WatchController};

use crate::cli::RunArgs;
use crate::commands::shutdown_notify;
use crate::commands::watch::{failure_policy, report_builds, restart_after_builds, runner_for};
use crate::config::{self, ConfigOverrides};
use crate::error::Result;
use crate::ui;

/// Execute the run command.
///
/// # Errors
///
/// Returns errors for an unknown target, invalid run options and a bundler
/// that cannot start watching.
pub async fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let loaded = config::load(config_path, overrides(&args))?;
    let config = loaded.config;
    validate(&config)?;

    let target = config.registry().get_target(&args.target)?;
    let signals = SignalRegistry::new();
    let runner = runner_for(&target, &config.run, signals.clone())?;

    let controller = WatchController::new(
        target.clone(),
        Arc::new(CommandBundler::new(config.watch.clone())),
        Arc::new(ReadinessRegistry::with_policy(failure_policy(
            config.watch.fail_fast,
        ))),
    );
    report_builds(&target.name, controller.subscribe());
    restart_after_builds(controller.subscribe(), runner.clone());
    controller.ensure_started()?;

    ui::info(&format!(
        "Watching '{}'; {} restarts after every build",
        target.name,
        runner.file().display()
    ));

    shutdown_notify(&signals).notified().await;
    runner.stop();
    Ok(())
}

fn overrides(args: &RunArgs) -> ConfigOverrides {
    let inspect = args.inspect || args.inspect_brk;
    let overrides = ConfigOverrides::new()
        .set_opt("run.interpreter", args.interpreter.clone())
        .set_flag("run.inspect.enabled", inspect)
        .set_opt("run.inspect.port", args.inspect_port)
        .set_flag("run.inspect.ndb", args.ndb)
        .set_flag("watch.fail_fast", args.fail_fast);

    let overrides = if args.inspect_brk {
        overrides.set("run.inspect.command", "inspect-brk")
    } else {
        overrides
    };

    if args.args.is_empty() {
        overrides
    } else {
        overrides.set("run.args", &args.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use kiln_config::InspectCommand;
    use serial_test::serial;
    use tempfile::TempDir;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["kiln", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Run(args) => args,
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    #[serial]
    fn test_inspect_brk_enables_debugger() {
        let dir = TempDir::new().unwrap();
        let args = run_args(&["api", "--inspect-brk", "--inspect-port", "9333", "--", "-v"]);

        let run = config::load_from(dir.path(), None, overrides(&args))
            .unwrap()
            .config
            .run;
        assert!(run.inspect.enabled);
        assert_eq!(run.inspect.command, InspectCommand::InspectBrk);
        assert_eq!(run.inspect.port, 9333);
        assert_eq!(run.args, vec!["-v"]);
    }

    #[test]
    #[serial]
    fn test_plain_run_keeps_configured_args() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("kiln.toml"), "[run]\nargs = [\"--prod\"]\n").unwrap();

        let run = config::load_from(dir.path(), None, overrides(&run_args(&["api"])))
            .unwrap()
            .config
            .run;
        assert!(!run.inspect.enabled);
        assert_eq!(run.args, vec!["--prod"]);
    }
}
