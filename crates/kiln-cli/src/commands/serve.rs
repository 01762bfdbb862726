//! Serve command: the standalone static dev server.

use std::path::Path;

use kiln_config::TlsOptions;
use kiln_dev::{DevServer, SignalRegistry};

use crate::cli::ServeArgs;
use crate::commands::shutdown_notify;
use crate::config::{self, absolutize, ConfigOverrides};
use crate::error::Result;
use crate::ui;

/// Execute the serve command.
///
/// Flags override `[serve]` from the config file. Paths given on the command
/// line are relative to the working directory.
///
/// # Errors
///
/// Returns errors for invalid options, unreadable TLS material and an address
/// that cannot be bound.
pub async fn execute(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let overrides = overrides(&args, &std::env::current_dir()?);
    let loaded = config::load(config_path, overrides)?;

    let signals = SignalRegistry::new();
    let server = DevServer::builder(loaded.config.serve)
        .signals(signals.clone())
        .on_stop(|_| ui::info("Dev server stopped"))
        .build()?;

    for base in &server.options().content_base {
        tracing::debug!("Serving {}", base.display());
    }

    server.start().await?;
    if let Some(url) = server.url().await {
        ui::success(&format!("Dev server running at {}", ui::format_url(&url)));
    }
    ui::info("Press Ctrl+C to stop");

    shutdown_notify(&signals).notified().await;
    server.stop().await;
    Ok(())
}

fn overrides(args: &ServeArgs, cwd: &Path) -> ConfigOverrides {
    let content_base: Vec<_> = args
        .content_base
        .iter()
        .map(|base| absolutize(cwd, base))
        .collect();
    let https = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => Some(TlsOptions {
            cert: absolutize(cwd, cert),
            key: absolutize(cwd, key),
        }),
        _ => None,
    };

    ConfigOverrides::new()
        .set_opt("serve.content_base", (!content_base.is_empty()).then_some(content_base))
        .set_opt("serve.host", args.host.clone())
        .set_opt("serve.port", args.port)
        .set_flag("serve.history_api_fallback", args.spa)
        .set_opt("serve.fallback", args.fallback.clone())
        .set_flag("serve.open", args.open)
        .set_opt("serve.https", https)
        .set_opt("serve.proxied", args.proxied.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use serial_test::serial;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn serve_args(argv: &[&str]) -> ServeArgs {
        let mut full = vec!["kiln", "serve"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Serve(args) => args,
            _ => panic!("Expected serve command"),
        }
    }

    #[test]
    fn test_no_flags_means_no_overrides() {
        assert!(overrides(&serve_args(&[]), Path::new("/work")).is_empty());
    }

    #[test]
    #[serial]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("kiln.toml"),
            "[serve]\nport = 4000\ncontent_base = [\"public\"]\n",
        )
        .unwrap();

        let args = serve_args(&[
            "-d", "dist", "--port", "9000", "--spa", "--cert", "c.pem", "--key", "k.pem",
        ]);
        let cwd = PathBuf::from("/work");
        let loaded = config::load_from(dir.path(), None, overrides(&args, &cwd)).unwrap();
        let serve = loaded.config.serve;

        assert_eq!(serve.port, 9000);
        assert_eq!(serve.content_base, vec![cwd.join("dist")]);
        assert!(serve.history_api_fallback);
        assert_eq!(
            serve.https,
            Some(TlsOptions {
                cert: cwd.join("c.pem"),
                key: cwd.join("k.pem"),
            })
        );
    }
}
