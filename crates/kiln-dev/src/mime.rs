//! Content type lookup by file extension.

use std::path::Path;

/// Fallback used by the dev middleware for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Fallback used by the standalone server for unknown extensions.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Determine the content type from a path's extension.
///
/// Returns `None` when the extension is missing or unknown so callers can pick
/// their own fallback.
pub fn content_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension().and_then(|ext| ext.to_str())?;

    let mime = match extension.to_ascii_lowercase().as_str() {
        "wasm" => "application/wasm",
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "txt" => TEXT_PLAIN,
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        _ => return None,
    };

    Some(mime)
}

/// Content type with an explicit fallback for unknown extensions.
pub fn content_type_or(path: &Path, fallback: &'static str) -> &'static str {
    content_type(path).unwrap_or(fallback)
}
