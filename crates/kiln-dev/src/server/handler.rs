//! Request handling for the standalone server.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use kiln_config::DevServerOptions;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::error::{DevError, Result};
use crate::fs::FileSystemHandle;
use crate::mime;

const FAVICON: &[u8] = include_bytes!("../../assets/favicon.ico");

/// Banner closing every generated page.
const SERVER_NAME: &str = "kiln dev server";

#[derive(Debug)]
pub(crate) struct ServeState {
    content_base: Vec<FileSystemHandle>,
    history_api_fallback: bool,
    fallback: PathBuf,
}

impl ServeState {
    pub(crate) fn new(options: &DevServerOptions) -> Self {
        Self {
            content_base: options
                .content_base
                .iter()
                .cloned()
                .map(FileSystemHandle::new)
                .collect(),
            history_api_fallback: options.history_api_fallback,
            fallback: options.fallback.clone(),
        }
    }
}

pub(crate) fn router(options: &DevServerOptions) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(Arc::new(ServeState::new(options)))
        .layer(TraceLayer::new_for_http())
}

async fn handle_request(State(state): State<Arc<ServeState>>, uri: Uri) -> Response {
    match serve(&state, &uri).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, path = uri.path(), "request failed");
            error_page(&e)
        }
    }
}

async fn serve(state: &ServeState, uri: &Uri) -> Result<Response> {
    let path = urlencoding::decode(uri.path())
        .map_err(|e| DevError::Server(format!("malformed request path {}: {e}", uri.path())))?;

    let mut relative = path.trim_start_matches('/').to_string();
    if relative.is_empty() || relative.ends_with('/') {
        relative.push_str("index.html");
    }

    if let Some(file) = find_file(&state.content_base, &relative).await? {
        return file_response(&file).await;
    }

    if path == "/favicon.ico" {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/x-icon")],
            FAVICON,
        )
            .into_response());
    }

    if state.history_api_fallback {
        let fallback = state.fallback.to_string_lossy();
        if let Some(file) = find_file(&state.content_base, &fallback).await? {
            return file_response(&file).await;
        }
    }

    Ok(not_found(&path))
}

/// First content base containing `relative` as a regular file.
async fn find_file(bases: &[FileSystemHandle], relative: &str) -> Result<Option<PathBuf>> {
    for base in bases {
        if let Some(file) = base.file(relative).await? {
            return Ok(Some(file));
        }
    }
    Ok(None)
}

async fn file_response(path: &Path) -> Result<Response> {
    let file = tokio::fs::File::open(path).await?;
    let content_type = mime::content_type_or(path, mime::TEXT_PLAIN);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

fn not_found(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
        format!("404 Not Found\n\n{path}\n\n{SERVER_NAME}\n"),
    )
        .into_response()
}

fn error_page(error: &DevError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
        format!(
            "500 Internal Server Error\n\n{}\n{SERVER_NAME}\n",
            render_error(error)
        ),
    )
        .into_response()
}

/// Error message followed by its source chain, one indented `->` line per cause.
pub(crate) fn render_error(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = format!("{error}\n");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(rendered, "    -> {cause}");
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn options(bases: &[&Path]) -> DevServerOptions {
        DevServerOptions {
            content_base: bases.iter().map(|p| p.to_path_buf()).collect(),
            ..DevServerOptions::default()
        }
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_content_bases_searched_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join("app.js"), "second").unwrap();
        std::fs::write(first.path().join("shared.css"), "first").unwrap();
        std::fs::write(second.path().join("shared.css"), "second").unwrap();

        let router = router(&options(&[first.path(), second.path()]));

        let (status, content_type, body) = get(router.clone(), "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/javascript");
        assert_eq!(body, "second");

        let (_, _, body) = get(router, "/shared.css?v=1").await;
        assert_eq!(body, "first");
    }

    #[tokio::test]
    async fn test_directory_path_serves_index() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        let router = router(&options(&[dir.path()]));

        let (status, content_type, body) = get(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/html; charset=utf-8");
        assert_eq!(body, "<h1>home</h1>");

        let (_, _, body) = get(router, "/docs/").await;
        assert_eq!(body, "<h1>docs</h1>");
    }

    #[tokio::test]
    async fn test_unknown_extension_is_text_plain() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.weird"), "hello").unwrap();
        let router = router(&options(&[dir.path()]));

        let (status, content_type, _) = get(router, "/notes.weird").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, mime::TEXT_PLAIN);
    }

    #[tokio::test]
    async fn test_favicon_falls_back_to_bundled_icon() {
        let dir = TempDir::new().unwrap();
        let router = router(&options(&[dir.path()]));

        let (status, content_type, _) = get(router, "/favicon.ico").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "image/x-icon");
    }

    #[tokio::test]
    async fn test_spa_fallback_serves_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<div id=app></div>").unwrap();
        let mut options = options(&[dir.path()]);
        options.history_api_fallback = true;

        let (status, _, body) = get(router(&options), "/users/42/profile").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<div id=app></div>");
    }

    #[tokio::test]
    async fn test_missing_file_is_404_naming_path() {
        let dir = TempDir::new().unwrap();
        let router = router(&options(&[dir.path()]));

        let (status, content_type, body) = get(router, "/missing%20page.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(content_type, mime::TEXT_PLAIN);
        assert!(body.contains("/missing page.js"));
        assert!(body.contains("kiln dev server"));
    }

    #[tokio::test]
    async fn test_traversal_is_not_served() {
        let root = TempDir::new().unwrap();
        let public = root.path().join("public");
        std::fs::create_dir(&public).unwrap();
        std::fs::write(root.path().join("secret.txt"), "secret").unwrap();
        let router = router(&options(&[public.as_path()]));

        let (status, _, body) = get(router, "/%2e%2e/secret.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_ne!(body, "secret");
    }

    #[test]
    fn test_render_error_lists_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = DevError::Spawn {
            program: "node".to_string(),
            source: io,
        };

        let rendered = render_error(&error);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "failed to spawn 'node': denied");
        assert_eq!(lines[1], "    -> denied");
    }

    #[tokio::test]
    async fn test_error_page_is_500_with_chain() {
        let response = error_page(&DevError::Io(std::io::Error::other("disk on fire")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("I/O error: disk on fire"));
        assert!(body.contains("    -> disk on fire"));
    }
}
