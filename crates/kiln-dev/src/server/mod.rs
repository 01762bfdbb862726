//! Standalone static dev server.
//!
//! Serves files from one or more content bases with SPA fallback and a bundled
//! favicon. The server owns its own lifecycle: [`DevServer::start`] binds and
//! registers SIGINT/SIGTERM listeners, [`DevServer::stop`] shuts down gracefully
//! and removes them. Both are no-ops when already in the requested state.

mod handler;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use kiln_config::{validate_serve, DevServerOptions, TlsOptions};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{DevError, Result};
use crate::signals::{self, ListenerId, Signal, SignalRegistry};

/// How long in-flight HTTPS connections get to finish on stop.
const TLS_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Lifecycle callback receiving the server.
pub type ServerCallback = Arc<dyn Fn(&DevServer) + Send + Sync>;

/// Opens a URL in the user's browser.
pub type BrowserOpener = Arc<dyn Fn(&str) + Send + Sync>;

enum Shutdown {
    Http(oneshot::Sender<()>),
    Https(Handle<SocketAddr>),
}

struct RunningServer {
    address: SocketAddr,
    url: String,
    shutdown: Shutdown,
    task: JoinHandle<()>,
    listeners: [ListenerId; 2],
}

struct ServerInner {
    options: DevServerOptions,
    signals: SignalRegistry,
    running: Mutex<Option<RunningServer>>,
    /// Guards against reopening the browser. Nothing sets it, so every start opens again.
    browser_opened: AtomicBool,
    opener: BrowserOpener,
    on_start: Option<ServerCallback>,
    on_stop: Option<ServerCallback>,
}

/// Standalone dev server. Clones control the same instance.
#[derive(Clone)]
pub struct DevServer {
    inner: Arc<ServerInner>,
}

impl fmt::Debug for DevServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevServer")
            .field("host", &self.inner.options.host)
            .field("port", &self.inner.options.port)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DevServer`].
pub struct DevServerBuilder {
    options: DevServerOptions,
    signals: Option<SignalRegistry>,
    opener: BrowserOpener,
    on_start: Option<ServerCallback>,
    on_stop: Option<ServerCallback>,
}

impl DevServerBuilder {
    pub fn signals(mut self, signals: SignalRegistry) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn browser_opener(mut self, opener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    pub fn on_start(mut self, callback: impl Fn(&DevServer) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_stop(mut self, callback: impl Fn(&DevServer) + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(callback));
        self
    }

    /// # Errors
    ///
    /// Returns [`DevError::Config`] when the options are invalid.
    pub fn build(self) -> Result<DevServer> {
        validate_serve(&self.options)?;

        Ok(DevServer {
            inner: Arc::new(ServerInner {
                options: self.options,
                signals: self.signals.unwrap_or_default(),
                running: Mutex::new(None),
                browser_opened: AtomicBool::new(false),
                opener: self.opener,
                on_start: self.on_start,
                on_stop: self.on_stop,
            }),
        })
    }
}

impl DevServer {
    pub fn builder(options: DevServerOptions) -> DevServerBuilder {
        DevServerBuilder {
            options,
            signals: None,
            opener: Arc::new(open_browser),
            on_start: None,
            on_stop: None,
        }
    }

    /// Server with OS signal delivery and the platform browser opener.
    pub fn new(options: DevServerOptions) -> Result<Self> {
        Self::builder(options).build()
    }

    pub fn options(&self) -> &DevServerOptions {
        &self.inner.options
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Address actually bound, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .running
            .lock()
            .await
            .as_ref()
            .map(|running| running.address)
    }

    /// URL announced for the running server.
    pub async fn url(&self) -> Option<String> {
        self.inner
            .running
            .lock()
            .await
            .as_ref()
            .map(|running| running.url.clone())
    }

    /// Bind and start serving. Does nothing if already started.
    ///
    /// # Errors
    ///
    /// Returns [`DevError::Server`] if the address cannot be bound and
    /// [`DevError::Tls`] if the certificate or key cannot be loaded.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            tracing::debug!("dev server already running");
            return Ok(());
        }

        let options = &self.inner.options;
        let address = resolve_address(&options.host, options.port).await?;
        let router = handler::router(options);

        let (address, shutdown, task) = match &options.https {
            None => serve_http(address, router).await?,
            Some(tls) => serve_https(address, tls, router).await?,
        };

        let url = match &options.proxied {
            Some(proxied) => proxied.trim_end_matches('/').to_string(),
            None => format!("{}://{}:{}", options.protocol(), options.host, address.port()),
        };
        tracing::info!("dev server running at {url}");
        for base in &options.content_base {
            tracing::info!("serving files from {}", base.display());
        }

        let listeners = Signal::ALL.map(|signal| {
            let server = Arc::downgrade(&self.inner);
            self.inner.signals.register(
                signal,
                signals::handler(move || {
                    let server = server.clone();
                    async move { stop_on_signal(server, signal).await }
                }),
            )
        });

        *running = Some(RunningServer {
            address,
            url: url.clone(),
            shutdown,
            task,
            listeners,
        });
        drop(running);

        if options.open && !self.inner.browser_opened.load(Ordering::SeqCst) {
            (self.inner.opener)(&url);
        }

        if let Some(on_start) = &self.inner.on_start {
            on_start(self);
        }
        Ok(())
    }

    /// Shut down gracefully. Does nothing if not running.
    pub async fn stop(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };

        for id in running.listeners {
            self.inner.signals.deregister(id);
        }

        match running.shutdown {
            Shutdown::Http(tx) => {
                let _ = tx.send(());
            }
            Shutdown::Https(handle) => handle.graceful_shutdown(Some(TLS_GRACE_PERIOD)),
        }
        if let Err(e) = running.task.await {
            tracing::warn!(error = %e, "dev server task ended abnormally");
        }
        tracing::info!("dev server at {} stopped", running.url);

        if let Some(on_stop) = &self.inner.on_stop {
            on_stop(self);
        }
    }
}

async fn stop_on_signal(server: Weak<ServerInner>, signal: Signal) {
    let Some(inner) = server.upgrade() else {
        return;
    };
    tracing::info!(%signal, "stopping dev server");

    let exit = inner.options.exit_on_signal;
    DevServer { inner }.stop().await;

    if exit {
        std::process::exit(0);
    }
}

async fn resolve_address(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| DevError::Server(format!("cannot resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| DevError::Server(format!("no address found for {host}")))
}

async fn serve_http(
    address: SocketAddr,
    router: axum::Router,
) -> Result<(SocketAddr, Shutdown, JoinHandle<()>)> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| DevError::Server(format!("failed to bind to {address}: {e}")))?;
    let bound = listener.local_addr()?;

    let (tx, rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "dev server error");
        }
    });

    Ok((bound, Shutdown::Http(tx), task))
}

async fn serve_https(
    address: SocketAddr,
    tls: &TlsOptions,
    router: axum::Router,
) -> Result<(SocketAddr, Shutdown, JoinHandle<()>)> {
    let config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .map_err(|e| {
            DevError::Tls(format!(
                "cannot load certificate {} and key {}: {e}",
                tls.cert.display(),
                tls.key.display()
            ))
        })?;

    let handle: Handle<SocketAddr> = Handle::new();
    let server = axum_server::bind_rustls(address, config).handle(handle.clone());
    let task = tokio::spawn(async move {
        if let Err(e) = server.serve(router.into_make_service()).await {
            tracing::error!(error = %e, "dev server error");
        }
    });

    let Some(bound) = handle.listening().await else {
        return Err(DevError::Server(format!("failed to bind to {address}")));
    };
    Ok((bound, Shutdown::Https(handle), task))
}

/// Open the server URL in the default browser.
///
/// Uses platform-specific commands:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
pub fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => tracing::info!("opened browser at {url}"),
        Err(e) => tracing::warn!("failed to open browser: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> DevServerOptions {
        DevServerOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
            content_base: vec![PathBuf::from(".")],
            exit_on_signal: false,
            ..DevServerOptions::default()
        }
    }

    #[test]
    fn test_new_rejects_missing_content_base() {
        let options = DevServerOptions::default();
        assert!(matches!(
            DevServer::new(options),
            Err(DevError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let signals = SignalRegistry::manual();
        let server = DevServer::builder(options())
            .signals(signals.clone())
            .build()
            .unwrap();

        server.start().await.unwrap();
        let address = server.local_addr().await.unwrap();
        server.start().await.unwrap();

        assert_eq!(server.local_addr().await, Some(address));
        assert_eq!(signals.registered_count(), 2);
        assert_eq!(signals.total_registrations(), 2);

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running().await);
        assert_eq!(signals.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_url_reports_bound_port() {
        let server = DevServer::builder(options())
            .signals(SignalRegistry::manual())
            .build()
            .unwrap();

        server.start().await.unwrap();
        let port = server.local_addr().await.unwrap().port();
        assert_ne!(port, 0);
        assert_eq!(
            server.url().await.unwrap(),
            format!("http://127.0.0.1:{port}")
        );
        server.stop().await;
    }

    #[tokio::test]
    async fn test_browser_opens_on_every_start() {
        let opened = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let mut options = options();
        options.open = true;

        let server = {
            let opened = opened.clone();
            DevServer::builder(options)
                .signals(SignalRegistry::manual())
                .browser_opener(move |url| opened.lock().push(url.to_string()))
                .build()
                .unwrap()
        };

        server.start().await.unwrap();
        server.stop().await;
        server.start().await.unwrap();
        server.stop().await;

        let opened = opened.lock();
        assert_eq!(opened.len(), 2);
        assert!(opened[0].starts_with("http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_signal_stops_server_and_removes_listeners() {
        let signals = SignalRegistry::manual();
        let server = DevServer::builder(options())
            .signals(signals.clone())
            .build()
            .unwrap();

        server.start().await.unwrap();
        assert_eq!(signals.count_for(Signal::Terminate), 1);

        signals.trigger(Signal::Terminate).await;
        assert!(!server.is_running().await);
        assert_eq!(signals.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_callbacks_fire_once_per_transition() {
        use std::sync::atomic::AtomicUsize;

        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let server = {
            let started = started.clone();
            let stopped = stopped.clone();
            DevServer::builder(options())
                .signals(SignalRegistry::manual())
                .on_start(move |_| {
                    started.fetch_add(1, Ordering::SeqCst);
                })
                .on_stop(move |_| {
                    stopped.fetch_add(1, Ordering::SeqCst);
                })
                .build()
                .unwrap()
        };

        server.stop().await;
        server.start().await.unwrap();
        server.start().await.unwrap();
        server.stop().await;
        server.stop().await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_url_prefers_proxied_address() {
        let mut options = options();
        options.proxied = Some("https://dev.example.test/".to_string());
        let server = DevServer::builder(options)
            .signals(SignalRegistry::manual())
            .build()
            .unwrap();

        server.start().await.unwrap();
        assert_eq!(server.url().await.unwrap(), "https://dev.example.test");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_missing_certificate_is_tls_error() {
        let mut options = options();
        options.https = Some(TlsOptions {
            cert: PathBuf::from("/no/cert.pem"),
            key: PathBuf::from("/no/key.pem"),
        });
        let server = DevServer::builder(options)
            .signals(SignalRegistry::manual())
            .build()
            .unwrap();

        assert!(matches!(server.start().await, Err(DevError::Tls(_))));
        assert!(!server.is_running().await);
    }
}
