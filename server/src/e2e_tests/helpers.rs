//! Common helpers for end-to-end tests.
//!
//! Each test boots the real router on an ephemeral port and talks HTTP/1.1
//! over a plain `TcpStream`, so streaming and client disconnects behave
//! exactly as they do for real clients.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::clock::TokioTimer;
use crate::messages::ResetDefaults;
use crate::protocol::PollingMethod;
use crate::routes;
use crate::simulation::{RunParams, Simulation, SimulationOptions};

/// A running server. The server task is aborted on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub simulation: Arc<Simulation>,
    server: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with a 30 second long-poll wait timeout.
    pub async fn start(method: PollingMethod) -> Self {
        Self::with_wait_timeout(method, RunParams::DEFAULT_WAIT_TIMEOUT).await
    }

    /// Start a server with the given long-poll wait timeout.
    pub async fn with_wait_timeout(method: PollingMethod, wait_timeout: Duration) -> Self {
        let options = SimulationOptions {
            initial: RunParams {
                wait_timeout,
                ..RunParams::default()
            },
            seed: Some(1),
            ..SimulationOptions::default()
        };
        let simulation = Simulation::new(Arc::new(TokioTimer), options);
        let app = routes::router(
            Arc::clone(&simulation),
            method,
            ResetDefaults::default(),
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            simulation,
            server,
        }
    }

    /// Start a run directly, bypassing `/reset`, for sub-second delays.
    pub fn start_run(&self, delay_ms: u64, error_rate: f64) {
        let params = RunParams {
            delay: Duration::from_millis(delay_ms),
            error_rate,
            ..self.simulation.params()
        };
        self.simulation
            .start(params)
            .expect("No run should be pending");
    }

    /// Send a request and read the whole response.
    pub async fn request(&self, method: &str, path: &str, body: &str) -> HttpResponse {
        let mut stream = self.send(method, path, body).await;
        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .expect("Failed to read response");
        HttpResponse::parse(&raw)
    }

    /// Send a request without reading the response.
    ///
    /// Dropping the returned stream closes the connection, as a client that
    /// goes away mid-request would.
    pub async fn send(&self, method: &str, path: &str, body: &str) -> TcpStream {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect");
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            self.addr,
            body.len()
        );
        stream
            .write_all(request.as_bytes())
            .await
            .expect("Failed to write request");
        stream
    }

    pub async fn get_status(&self) -> HttpResponse {
        self.request("GET", "/status", "").await
    }

    pub async fn reset(&self, body: &str) -> HttpResponse {
        self.request("POST", "/reset", body).await
    }

    /// Open `/status` as an event stream and read the response head.
    pub async fn open_events(&self) -> EventStream {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect");
        let request = format!(
            "GET /status HTTP/1.1\r\nHost: {}\r\nAccept: text/event-stream\r\nConnection: close\r\n\r\n",
            self.addr
        );
        stream
            .write_all(request.as_bytes())
            .await
            .expect("Failed to write request");

        let mut reader = BufReader::new(stream);
        let mut head = String::new();
        loop {
            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .await
                .expect("Failed to read response head");
            if read == 0 || line == "\r\n" {
                break;
            }
            head.push_str(&line);
        }
        let (status, headers) = parse_head(&head);

        EventStream {
            status,
            headers,
            head,
            reader,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A fully read HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let (head, body) = text
            .split_once("\r\n\r\n")
            .expect("Response should have a head");
        let (status, headers) = parse_head(head);

        let body = if headers
            .get("transfer-encoding")
            .is_some_and(|v| v.contains("chunked"))
        {
            dechunk(body)
        } else {
            body.to_string()
        };

        Self {
            status,
            headers,
            body,
        }
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Body should be JSON")
    }

    /// The `result` field of a `/status` body.
    pub fn result(&self) -> String {
        self.json()["result"]
            .as_str()
            .expect("Body should have a string result")
            .to_string()
    }
}

/// An open server-sent event stream.
pub struct EventStream {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Response head as received, for headers that may repeat.
    pub head: String,
    reader: BufReader<TcpStream>,
}

impl EventStream {
    /// Read the payload of the next event, or `None` once the stream ends.
    pub async fn next_event(&mut self) -> Option<String> {
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await.ok()?;
            if read == 0 {
                return None;
            }
            let line = line.trim_end();
            if let Some(data) = line.strip_prefix("data: ") {
                return Some(data.to_string());
            }
            // Terminating chunk of a chunked body
            if line == "0" {
                return None;
            }
        }
    }

    /// Like [`next_event`](Self::next_event), failing the test after `limit`.
    pub async fn next_event_within(&mut self, limit: Duration) -> Option<String> {
        tokio::time::timeout(limit, self.next_event())
            .await
            .expect("Timed out waiting for the event stream")
    }
}

fn parse_head(head: &str) -> (u16, HashMap<String, String>) {
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("Response should have a status line");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    (status, headers)
}

fn dechunk(mut body: &str) -> String {
    let mut out = String::new();
    while let Some((size, rest)) = body.split_once("\r\n") {
        let size = usize::from_str_radix(size.trim(), 16).unwrap_or(0);
        if size == 0 || rest.len() < size {
            break;
        }
        out.push_str(&rest[..size]);
        body = rest[size..].trim_start_matches("\r\n");
    }
    out
}

/// Expected event payload for a status.
pub fn event(result: &str) -> String {
    format!("{{\"result\": \"{result}\"}}")
}
