//! Dev command: the watch-driven middleware in front of an axum app.
//!
//! 1. Load configuration and resolve the build and serve targets
//! 2. Wrap a fallback app (first content base, else 404) with the middleware
//! 3. For `run_on_development` targets, start watching right away and restart
//!    the built entry after every successful build
//! 4. Serve until SIGINT/SIGTERM, answering requests still held on a build
//!    with 503 so shutdown does not wait for it

use std::path::Path;
use std::sync::Arc;

use axum::{http::StatusCode, Router};
use kiln_config::{validate, DevServerOptions};
use kiln_dev::{CommandBundler, DevMiddlewareFactory, ReadinessRegistry, SignalRegistry};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::cli::DevArgs;
use crate::commands::shutdown_notify;
use crate::commands::watch::{failure_policy, report_builds, restart_after_builds, runner_for};
use crate::config::{self, ConfigOverrides};
use crate::error::{CliError, Result};
use crate::ui;

/// Execute the dev command.
///
/// # Errors
///
/// Returns errors for unknown targets, invalid configuration and an address
/// that cannot be bound. Build failures are reported, not returned.
pub async fn execute(args: DevArgs, config_path: Option<&Path>) -> Result<()> {
    let overrides = ConfigOverrides::new()
        .set_opt("serve.host", args.host.clone())
        .set_opt("serve.port", args.port)
        .set_flag("watch.fail_fast", args.fail_fast);
    let loaded = config::load(config_path, overrides)?;
    let config = loaded.config;
    validate(&config)?;

    let serve_target = args.serve.as_deref().unwrap_or(&args.target);
    let factory = DevMiddlewareFactory::new(
        config.registry(),
        Arc::new(CommandBundler::new(config.watch.clone())),
        Arc::new(ReadinessRegistry::with_policy(failure_policy(
            config.watch.fail_fast,
        ))),
    );
    let middleware = factory.generate(&args.target, serve_target)?;
    let build = middleware.build_target().clone();

    ui::info(&format!(
        "Building '{}' and serving {}",
        build.name,
        middleware.directory().display()
    ));

    let signals = SignalRegistry::new();
    let controller = middleware.controller().clone();
    report_builds(&build.name, controller.subscribe());

    if build.run_on_development {
        let runner = runner_for(&build, &config.run, signals.clone())?;
        restart_after_builds(controller.subscribe(), runner);
        controller.ensure_started()?;
    }

    let app = middleware
        .wrap(fallback_app(&config.serve))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let address = format!("{}:{}", config.serve.host, config.serve.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| CliError::Server(format!("failed to bind to {address}: {e}")))?;
    let local = listener.local_addr()?;

    ui::success(&format!(
        "Dev server listening on {}",
        ui::format_url(&format!("http://{local}"))
    ));
    ui::info("Press Ctrl+C to stop");

    let shutdown = shutdown_notify(&signals);
    let release_held = factory.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            release_held.cancel();
        })
        .await?;

    ui::success("Development server stopped");
    Ok(())
}

/// App answering requests the middleware passes on.
fn fallback_app(serve: &DevServerOptions) -> Router {
    match serve.content_base.first() {
        Some(base) => Router::new().fallback_service(ServeDir::new(base)),
        None => Router::new().fallback(|| async { (StatusCode::NOT_FOUND, "404 Not Found") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_fallback_without_content_base_is_404() {
        let response = fallback_app(&DevServerOptions::default())
            .oneshot(Request::builder().uri("/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fallback_serves_first_content_base() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("robots.txt"), "User-agent: *").unwrap();
        let serve = DevServerOptions {
            content_base: vec![dir.path().to_path_buf()],
            ..DevServerOptions::default()
        };

        let response = fallback_app(&serve)
            .oneshot(
                Request::builder()
                    .uri("/robots.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
