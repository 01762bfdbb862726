//! Standalone dev server configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::defaults::{default_exit_on_signal, default_fallback, default_host, default_port};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevServerOptions {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directories searched in order; the first one containing the file wins
    #[serde(default)]
    pub content_base: Vec<PathBuf>,

    /// Serve `fallback` for every unmatched path (client-side routing)
    #[serde(default)]
    pub history_api_fallback: bool,

    /// Entry file served by the SPA fallback, relative to the content bases
    #[serde(default = "default_fallback")]
    pub fallback: PathBuf,

    #[serde(default)]
    pub https: Option<TlsOptions>,

    /// Open the server URL in the default browser on start
    #[serde(default)]
    pub open: bool,

    /// Public URL when the server sits behind a proxy (e.g. "https://dev.example.test")
    #[serde(default)]
    pub proxied: Option<String>,

    /// Exit the process after a SIGINT/SIGTERM triggered stop
    #[serde(default = "default_exit_on_signal")]
    pub exit_on_signal: bool,
}

impl Default for DevServerOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            content_base: Vec::new(),
            history_api_fallback: false,
            fallback: default_fallback(),
            https: None,
            open: false,
            proxied: None,
            exit_on_signal: default_exit_on_signal(),
        }
    }
}

impl DevServerOptions {
    /// Scheme matching the configured transport.
    pub fn protocol(&self) -> &'static str {
        if self.https.is_some() { "https" } else { "http" }
    }

    /// URL announced in logs and opened in the browser.
    pub fn url(&self) -> String {
        match &self.proxied {
            Some(proxied) => proxied.trim_end_matches('/').to_string(),
            None => format!("{}://{}:{}", self.protocol(), self.host, self.port),
        }
    }
}

/// PEM encoded certificate material selecting the HTTPS transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    pub cert: PathBuf,
    pub key: PathBuf,
}
