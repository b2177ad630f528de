//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use podman_wsl_proxy::config::ProxyConfig;
use podman_wsl_proxy::lifecycle::{idle, ActivityTracker, Shutdown};
use podman_wsl_proxy::net::BoundSocket;
use podman_wsl_proxy::translate::{Translator, WindowsPathConverter};
use podman_wsl_proxy::ProxyServer;

pub const SHARED_ROOT: &str = "/mnt/wsl/distro-roots/Ubuntu";

/// One request as the mock engine received it, raw.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

pub struct MockEngine {
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
    socket: PathBuf,
    task: JoinHandle<()>,
}

impl MockEngine {
    /// Wait until a request whose head starts with `head_prefix` has been
    /// captured.
    pub async fn captured(&self, head_prefix: &str) -> CapturedRequest {
        for _ in 0..200 {
            {
                let requests = self.requests.lock().await;
                if let Some(request) = requests.iter().find(|r| r.head.starts_with(head_prefix)) {
                    return request.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no captured request starting with {head_prefix:?}");
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Stop accepting and remove the socket, simulating a dead engine.
    pub fn stop(self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.socket);
    }
}

/// Build a response with a correct Content-Length for the given body.
pub fn canned(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

const PING_RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Mock engine on a Unix socket: answers `/_ping` with 200 and everything
/// else with the given raw response, capturing each request it sees.
pub async fn start_mock_engine(socket: PathBuf, response: String) -> MockEngine {
    let listener = UnixListener::bind(&socket).unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&requests);

    let task = tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else {
                break;
            };
            let captured = Arc::clone(&captured);
            let response = response.clone();
            tokio::spawn(async move {
                let Some((head, body)) = read_request(&mut conn).await else {
                    return;
                };
                let is_ping = head.starts_with("GET /_ping");
                captured.lock().await.push(CapturedRequest { head, body });
                let reply = if is_ping { PING_RESPONSE } else { &response };
                let _ = conn.write_all(reply.as_bytes()).await;
                let _ = conn.shutdown().await;
            });
        }
    });

    MockEngine {
        requests,
        socket,
        task,
    }
}

/// Mock engine answering every non-ping request with `101 UPGRADED`, an
/// immediate `s1` burst written together with the head, then echoing
/// everything it receives.
pub async fn start_upgrade_engine(socket: PathBuf) -> JoinHandle<()> {
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Some((head, _body)) = read_request(&mut conn).await else {
                    return;
                };
                if head.starts_with("GET /_ping") {
                    let _ = conn.write_all(PING_RESPONSE.as_bytes()).await;
                    return;
                }
                let _ = conn
                    .write_all(
                        b"HTTP/1.1 101 UPGRADED\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\ns1",
                    )
                    .await;
                let mut chunk = [0u8; 4096];
                loop {
                    match conn.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&chunk[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    })
}

async fn read_request(conn: &mut UnixStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = conn.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = conn.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    Some((head, body))
}

/// Converter reporting every path as local to the Ubuntu distro.
pub fn wsl_local_converter() -> Box<dyn WindowsPathConverter> {
    fn to_windows(path: &str) -> std::io::Result<String> {
        Ok(format!(
            "\\\\wsl.localhost\\Ubuntu{}",
            path.replace('/', "\\")
        ))
    }
    Box::new(to_windows)
}

/// Converter reporting every path as a native Windows drive path.
pub fn windows_drive_converter() -> Box<dyn WindowsPathConverter> {
    fn to_windows(_path: &str) -> std::io::Result<String> {
        Ok("C:\\Users\\user\\data".to_string())
    }
    Box::new(to_windows)
}

pub fn failing_converter() -> Box<dyn WindowsPathConverter> {
    fn to_windows(_path: &str) -> std::io::Result<String> {
        Err(std::io::Error::other("wslpath unavailable"))
    }
    Box::new(to_windows)
}

pub fn test_config(upstream: &Path, downstream: &Path, idle_timeout_secs: i64) -> ProxyConfig {
    ProxyConfig {
        upstream_socket: upstream.to_path_buf(),
        downstream_socket: downstream.to_path_buf(),
        shared_root: Some(PathBuf::from(SHARED_ROOT)),
        idle_timeout_secs,
        ..Default::default()
    }
}

pub struct ProxyHarness {
    pub downstream: PathBuf,
    pub shutdown: Arc<Shutdown>,
    pub tracker: ActivityTracker,
    pub server: JoinHandle<()>,
}

/// Run a fully wired proxy against the given config, panicking if the
/// pre-flight probe fails.
pub async fn start_proxy(config: ProxyConfig, converter: Box<dyn WindowsPathConverter>) -> ProxyHarness {
    let shared_root = config.resolved_shared_root().unwrap();
    let translator = Arc::new(Translator::new(shared_root, converter));
    let config = Arc::new(config);
    let shutdown = Arc::new(Shutdown::new());
    let tracker = ActivityTracker::new();

    let server = ProxyServer::new(
        Arc::clone(&config),
        translator,
        tracker.clone(),
        Arc::clone(&shutdown),
    );
    server.preflight().await.unwrap();

    let socket = BoundSocket::acquire(&config.downstream_socket).unwrap();
    if let Some(timeout) = config.idle_timeout() {
        tokio::spawn(idle::run_idle_timer(
            tracker.clone(),
            timeout,
            Arc::clone(&shutdown),
        ));
    }

    let downstream = config.downstream_socket.clone();
    let handle = tokio::spawn(async move {
        server.run(socket).await.unwrap();
    });

    ProxyHarness {
        downstream,
        shutdown,
        tracker,
        server: handle,
    }
}

/// Send one raw request (which should carry `Connection: close`) and read
/// the whole response.
pub async fn roundtrip(socket: &Path, request: &[u8]) -> Vec<u8> {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
        }
    }
    response
}
