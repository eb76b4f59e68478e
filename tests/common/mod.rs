//! Shared utilities for integration testing.
//!
//! Provides a programmable mock BMC upstream speaking plain HTTP/1.1 over a
//! raw TCP listener, with keep-alive support so connection reuse is
//! observable, and full request recording so header and body transparency
//! can be asserted byte-for-byte.

// Each test binary uses a different slice of these helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// One request as received by the mock upstream.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    /// Raw request target: path and query exactly as on the wire.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Response the handler wants the mock to produce.
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Handler = Arc<dyn Fn(&ReceivedRequest) -> MockResponse + Send + Sync>;

/// A mock Redfish upstream on an ephemeral port.
pub struct MockUpstream {
    pub addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockUpstream {
    /// Start a mock that always answers with the same status and body.
    pub async fn start(status: u16, body: &'static str) -> Self {
        Self::start_with(move |_| MockResponse::new(status, body)).await
    }

    /// Start a mock driven by a per-request handler.
    pub async fn start_with<F>(handler: F) -> Self
    where
        F: Fn(&ReceivedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accepts = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        {
            let accepts = accepts.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((socket, _)) => {
                            accepts.fetch_add(1, Ordering::SeqCst);
                            let requests = requests.clone();
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                let _ = serve_connection(socket, requests, handler).await;
                            });
                        }
                        Err(_) => break,
                    }
                }
            });
        }

        Self {
            addr,
            accepts,
            requests,
        }
    }

    /// Number of TCP connections accepted so far.
    pub fn accept_count(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_connection(
    socket: tokio::net::TcpStream,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    handler: Handler,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);

    // Keep-alive loop: handle requests until the peer goes away.
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim().to_string();
                if name == "content-length" {
                    content_length = value.parse().unwrap_or(0);
                }
                headers.push((name, value));
            }
        }

        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body).await?;
        }

        let received = ReceivedRequest {
            method,
            target,
            headers,
            body,
        };
        let response = handler(&received);
        requests.lock().unwrap().push(received);

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        let status_text = match response.status {
            200 => "200 OK",
            201 => "201 Created",
            301 => "301 Moved Permanently",
            401 => "401 Unauthorized",
            404 => "404 Not Found",
            500 => "500 Internal Server Error",
            502 => "502 Bad Gateway",
            503 => "503 Service Unavailable",
            _ => "200 OK",
        };

        let mut head = format!("HTTP/1.1 {}\r\n", status_text);
        for (name, value) in &response.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            response.body.len()
        ));

        reader.get_mut().write_all(head.as_bytes()).await?;
        reader.get_mut().write_all(response.body.as_bytes()).await?;
    }
}
