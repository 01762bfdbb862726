//! Standalone server exercised over a real socket.

use std::net::SocketAddr;
use std::path::PathBuf;

use kiln_config::DevServerOptions;
use kiln_dev::{DevServer, Signal, SignalRegistry};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn get(address: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn options(bases: Vec<PathBuf>) -> DevServerOptions {
    DevServerOptions {
        host: "127.0.0.1".to_string(),
        port: 0,
        content_base: bases,
        history_api_fallback: true,
        exit_on_signal: false,
        ..DevServerOptions::default()
    }
}

#[tokio::test]
async fn serves_files_and_spa_fallback() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<main>spa</main>").unwrap();
    std::fs::write(dir.path().join("style.css"), "body{}").unwrap();

    let server = DevServer::builder(options(vec![dir.path().to_path_buf()]))
        .signals(SignalRegistry::manual())
        .build()
        .unwrap();
    server.start().await.unwrap();
    let address = server.local_addr().await.unwrap();

    let response = get(address, "/style.css").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.to_ascii_lowercase().contains("content-type: text/css"));
    assert!(response.contains("body{}"));

    let response = get(address, "/settings/profile").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("<main>spa</main>"));

    let response = get(address, "/favicon.ico").await;
    assert!(response.starts_with("HTTP/1.1 200"));

    server.stop().await;
    assert!(TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn missing_file_without_fallback_is_404() {
    let dir = TempDir::new().unwrap();
    let mut options = options(vec![dir.path().to_path_buf()]);
    options.history_api_fallback = false;

    let server = DevServer::builder(options)
        .signals(SignalRegistry::manual())
        .build()
        .unwrap();
    server.start().await.unwrap();
    let address = server.local_addr().await.unwrap();

    let response = get(address, "/nope.js").await;
    assert!(response.starts_with("HTTP/1.1 404"));
    assert!(response.contains("/nope.js"));

    server.stop().await;
}

#[tokio::test]
async fn restart_after_signal_registers_fresh_listeners() {
    let dir = TempDir::new().unwrap();
    let signals = SignalRegistry::manual();
    let server = DevServer::builder(options(vec![dir.path().to_path_buf()]))
        .signals(signals.clone())
        .build()
        .unwrap();

    server.start().await.unwrap();
    signals.trigger(Signal::Interrupt).await;
    assert!(!server.is_running().await);
    assert_eq!(signals.registered_count(), 0);

    server.start().await.unwrap();
    assert!(server.is_running().await);
    assert_eq!(signals.registered_count(), 2);
    assert_eq!(signals.total_registrations(), 4);

    server.stop().await;
    assert_eq!(signals.registered_count(), 0);
}
