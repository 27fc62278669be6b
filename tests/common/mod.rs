//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use devserve::config::ServerConfig;
use devserve::project::{MemoryStore, ProjectStore, ProjectSwitcher};
use devserve::{initialize, HttpServer, Shutdown};

/// Start a mock upstream that answers every request with `body`.
///
/// The response echoes the request line in `x-echo-request` and the `Host`
/// header it received in `x-echo-host`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let request_line = head.lines().next().unwrap_or_default().to_string();
                        let host = head
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("host").then(|| value.trim().to_string())
                            })
                            .unwrap_or_default();

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nx-echo-request: {}\r\nx-echo-host: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            request_line,
                            host,
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock upstream that answers one request with a chunked body.
///
/// `first` is written immediately; `second` and the terminating chunk are
/// held back until `release` fires.
pub async fn start_chunked_backend(
    first: &'static str,
    second: &'static str,
    release: oneshot::Receiver<()>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_head(&mut socket).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{:x}\r\n{}\r\n",
            first.len(),
            first
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let _ = socket.flush().await;

        let _ = release.await;
        let tail = format!("{:x}\r\n{}\r\n0\r\n\r\n", second.len(), second);
        let _ = socket.write_all(tail.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    addr
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub switcher: Arc<ProjectSwitcher>,
    pub store: Arc<MemoryStore>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
    pub dashboard: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}

/// Start a server with a short debounce and the given change-wait timeout.
pub async fn start_server(wait_timeout_secs: u64) -> TestServer {
    let dashboard = tempfile::tempdir().unwrap();
    std::fs::write(dashboard.path().join("index.html"), "<h1>dashboard</h1>").unwrap();
    std::fs::write(dashboard.path().join("reload.js"), "// reload").unwrap();

    let mut config = ServerConfig::default();
    config.dashboard.resource_dir = dashboard.path().to_path_buf();
    config.watch.debounce_ms = 50;
    config.changes.wait_timeout_secs = wait_timeout_secs;

    let store = Arc::new(MemoryStore::default());
    let services = initialize(config, Arc::clone(&store) as Arc<dyn ProjectStore>)
        .await
        .unwrap();
    let switcher = Arc::clone(&services.switcher);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(services);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer {
        addr,
        switcher,
        store,
        shutdown,
        handle,
        dashboard,
    }
}

/// Create `name` under `parent` with an `index.html` and return its canonical path.
pub fn project_dir(parent: &Path, name: &str, index: &str) -> std::path::PathBuf {
    let dir = parent.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), index).unwrap();
    dir.canonicalize().unwrap()
}

/// HTTP client that never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
