//! Request handler that holds requests until a target has been built.
//!
//! [`DevMiddlewareFactory::generate`] pairs a target to build with a target to
//! serve. The resulting [`DevMiddleware`] starts the watch session on its first
//! request, holds requests while the build target is not ready, and then serves
//! files straight from the serve target's build directory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::Router;
//! use kiln_config::{BuildTarget, TargetRegistry, WatchOptions};
//! use kiln_dev::{CommandBundler, DevMiddlewareFactory, ReadinessRegistry};
//!
//! # fn main() -> kiln_dev::Result<()> {
//! let mut targets = TargetRegistry::new();
//! targets.insert(BuildTarget::new("app", "src", "dist").with_command(["npx", "rollup", "-c"]));
//!
//! let factory = DevMiddlewareFactory::new(
//!     targets,
//!     Arc::new(CommandBundler::new(WatchOptions::default())),
//!     Arc::new(ReadinessRegistry::new()),
//! );
//! let middleware = factory.generate("app", "app")?;
//! let app: Router = middleware.wrap(Router::new());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use kiln_config::{BuildTarget, TargetRegistry};
use parking_lot::Mutex;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::bundler::Bundler;
use crate::controller::WatchController;
use crate::error::{DevError, Result};
use crate::fs::FileSystemHandle;
use crate::mime;
use crate::readiness::ReadinessRegistry;

/// What the outer stack should do with a request.
pub enum MiddlewareOutcome {
    /// The middleware produced the response.
    Respond(Response),
    /// Pass the request to the next handler.
    Next,
    /// Hand the error to the outer error handler.
    Failed(DevError),
}

impl fmt::Debug for MiddlewareOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareOutcome::Respond(response) => {
                f.debug_tuple("Respond").field(&response.status()).finish()
            }
            MiddlewareOutcome::Next => f.write_str("Next"),
            MiddlewareOutcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Creates middleware instances that share one watch session per build target.
pub struct DevMiddlewareFactory {
    targets: TargetRegistry,
    bundler: Arc<dyn Bundler>,
    registry: Arc<ReadinessRegistry>,
    controllers: Mutex<HashMap<String, Arc<WatchController>>>,
    shutdown: CancellationToken,
}

impl DevMiddlewareFactory {
    pub fn new(
        targets: TargetRegistry,
        bundler: Arc<dyn Bundler>,
        registry: Arc<ReadinessRegistry>,
    ) -> Self {
        Self {
            targets,
            bundler,
            registry,
            controllers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ReadinessRegistry> {
        &self.registry
    }

    /// Token that releases held requests of every generated middleware.
    ///
    /// Once cancelled, held and newly held requests are answered with 503 so a
    /// graceful server shutdown does not wait for a build that may never finish.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Middleware that builds `target_to_build` and serves `target_to_serve`.
    ///
    /// # Errors
    ///
    /// Returns [`DevError::Config`] if either target name is unknown. No watch
    /// session is started here; that happens on the first request.
    pub fn generate(&self, target_to_build: &str, target_to_serve: &str) -> Result<DevMiddleware> {
        let build = self.targets.get_target(target_to_build)?;
        let serve = self.targets.get_target(target_to_serve)?;

        let controller = self
            .controllers
            .lock()
            .entry(build.name.clone())
            .or_insert_with(|| {
                Arc::new(WatchController::new(
                    build.clone(),
                    self.bundler.clone(),
                    self.registry.clone(),
                ))
            })
            .clone();

        Ok(DevMiddleware {
            serve_root: FileSystemHandle::new(serve.paths.build.clone()),
            build,
            serve,
            registry: self.registry.clone(),
            controller,
            shutdown: self.shutdown.clone(),
        })
    }
}

/// Watch-driven request handler for one build/serve target pair.
#[derive(Clone)]
pub struct DevMiddleware {
    build: Arc<BuildTarget>,
    serve: Arc<BuildTarget>,
    serve_root: FileSystemHandle,
    registry: Arc<ReadinessRegistry>,
    controller: Arc<WatchController>,
    shutdown: CancellationToken,
}

impl DevMiddleware {
    /// Build directory of the served target.
    pub fn directory(&self) -> &Path {
        &self.serve.paths.build
    }

    pub fn build_target(&self) -> &Arc<BuildTarget> {
        &self.build
    }

    pub fn controller(&self) -> &Arc<WatchController> {
        &self.controller
    }

    /// Build output of the build target once it is ready.
    pub async fn file_system(&self) -> Result<FileSystemHandle> {
        self.registry.file_system(&self.build).await
    }

    /// Handle one request.
    ///
    /// While the build target is not ready the request is held until the next
    /// successful build and then passed on with [`MiddlewareOutcome::Next`]. Once
    /// ready, existing files are streamed and anything else falls through.
    pub async fn handle(&self, request: &Parts) -> MiddlewareOutcome {
        if let Err(e) = self.controller.ensure_started() {
            return MiddlewareOutcome::Failed(e);
        }

        if !self.registry.is_ready(&self.build.name) {
            let original = request
                .extensions
                .get::<OriginalUri>()
                .map(|OriginalUri(uri)| uri)
                .unwrap_or(&request.uri);
            tracing::info!(
                target_name = %self.build.name,
                "request on hold until build completes: {original}"
            );

            return tokio::select! {
                result = self.registry.file_system(&self.build) => match result {
                    Ok(_) => MiddlewareOutcome::Next,
                    Err(e) => MiddlewareOutcome::Failed(e),
                },
                () = self.shutdown.cancelled() => {
                    tracing::debug!(target_name = %self.build.name, "released held request for shutdown");
                    MiddlewareOutcome::Respond(shutting_down())
                }
            };
        }

        self.serve(&request.uri).await
    }

    async fn serve(&self, uri: &Uri) -> MiddlewareOutcome {
        // Not a file path this middleware could have produced; the app may know it
        let Ok(decoded) = urlencoding::decode(uri.path()) else {
            tracing::debug!("passing on undecodable path {}", uri.path());
            return MiddlewareOutcome::Next;
        };

        let path = match self.serve_root.file(&decoded).await {
            Ok(Some(path)) => path,
            Ok(None) => return MiddlewareOutcome::Next,
            Err(e) => return MiddlewareOutcome::Failed(e.into()),
        };

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => return MiddlewareOutcome::Failed(e.into()),
        };

        let content_type = mime::content_type_or(&path, mime::OCTET_STREAM);
        let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        *response.status_mut() = StatusCode::OK;

        MiddlewareOutcome::Respond(response)
    }

    /// Put this middleware in front of every route of `router`.
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, dev_middleware))
    }
}

fn shutting_down() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
        "503 Service Unavailable\n\ndev server is shutting down\n",
    )
        .into_response()
}

/// Axum adapter: `Next` runs the inner service, `Failed` renders a 500.
pub async fn dev_middleware(
    State(dev): State<DevMiddleware>,
    request: Request,
    next: middleware::Next,
) -> Response {
    let (parts, body) = request.into_parts();

    match dev.handle(&parts).await {
        MiddlewareOutcome::Respond(response) => response,
        MiddlewareOutcome::Next => next.run(Request::from_parts(parts, body)).await,
        MiddlewareOutcome::Failed(e) => e.into_response(),
    }
}
