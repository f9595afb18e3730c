//! Throwaway HTTP/1.1 backend serving scripted replies

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use folio_chat::{CancelHandle, Config, StreamCallbacks, StreamError, SuggestionSource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the backend sends for one endpoint
#[derive(Debug, Clone)]
pub enum Reply {
    /// Chunked body written piece by piece
    Chunked {
        status: u16,
        chunks: Vec<String>,
        delay: Duration,
    },
    /// Complete JSON document
    Json { status: u16, body: String },
    /// Chunked body cut off before its terminating chunk
    Truncated { chunks: Vec<String> },
    /// Chunked body that never finishes
    Stall { status: u16, chunks: Vec<String> },
    /// Another reply, sent only after a pause
    Late { after: Duration, reply: Box<Reply> },
}

impl Reply {
    pub fn chunks(chunks: &[&str]) -> Self {
        Reply::Chunked {
            status: 200,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            delay: Duration::from_millis(10),
        }
    }

    pub fn suggestions(items: &[&str]) -> Self {
        Reply::Json {
            status: 200,
            body: serde_json::json!({ "suggestions": items }).to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Json {
            status,
            body: r#"{"detail":"unavailable"}"#.to_string(),
        }
    }

    pub fn truncated(chunks: &[&str]) -> Self {
        Reply::Truncated {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn stall(chunks: &[&str]) -> Self {
        Reply::Stall {
            status: 200,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Headers with `status`, then a body that never arrives
    pub fn stall_status(status: u16) -> Self {
        Reply::Stall {
            status,
            chunks: Vec::new(),
        }
    }

    pub fn late(after: Duration, reply: Reply) -> Self {
        Reply::Late {
            after,
            reply: Box::new(reply),
        }
    }
}

pub struct Backend {
    base_url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<(String, String)>>>,
}

impl Backend {
    pub async fn start(text: Reply, suggestions: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind backend");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let hits = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));

        let accept_hits = hits.clone();
        let accept_bodies = bodies.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_hits.fetch_add(1, Ordering::SeqCst);
                let text = text.clone();
                let suggestions = suggestions.clone();
                let bodies = accept_bodies.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, text, suggestions, bodies).await;
                });
            }
        });

        Self {
            base_url,
            hits,
            bodies,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            text_endpoint: format!("{}/search_question", self.base_url),
            suggestions_endpoint: format!("{}/suggestion", self.base_url),
            request_timeout_secs: 5,
            ..Config::default()
        }
    }

    /// Connections accepted so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// `(path, body)` of every request received so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.bodies.lock().expect("bodies lock").clone()
    }
}

/// Config pointing at a port nobody listens on
pub async fn unreachable_config() -> Config {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    Config {
        text_endpoint: format!("http://{addr}/search_question"),
        suggestions_endpoint: format!("http://{addr}/suggestion"),
        request_timeout_secs: 2,
        ..Config::default()
    }
}

async fn serve(
    mut socket: TcpStream,
    text: Reply,
    suggestions: Reply,
    bodies: Arc<Mutex<Vec<(String, String)>>>,
) -> io::Result<()> {
    let (path, body) = read_request(&mut socket).await?;
    let reply = if path.ends_with("/suggestion") {
        suggestions
    } else {
        text
    };
    bodies.lock().expect("bodies lock").push((path, body));
    let reply = match reply {
        Reply::Late { after, reply } => {
            tokio::time::sleep(after).await;
            *reply
        }
        other => other,
    };
    write_reply(&mut socket, &reply).await
}

async fn read_request(socket: &mut TcpStream) -> io::Result<(String, String)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
    Ok((path, body))
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

fn chunked_head(status: u16) -> String {
    format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        reason(status)
    )
}

async fn write_chunk(socket: &mut TcpStream, chunk: &str) -> io::Result<()> {
    socket
        .write_all(format!("{:x}\r\n{chunk}\r\n", chunk.len()).as_bytes())
        .await?;
    socket.flush().await
}

async fn write_reply(socket: &mut TcpStream, reply: &Reply) -> io::Result<()> {
    match reply {
        Reply::Json { status, body } => {
            let response = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                reason(*status),
                body.len()
            );
            socket.write_all(response.as_bytes()).await?;
        }
        Reply::Chunked {
            status,
            chunks,
            delay,
        } => {
            socket.write_all(chunked_head(*status).as_bytes()).await?;
            socket.flush().await?;
            for chunk in chunks {
                tokio::time::sleep(*delay).await;
                write_chunk(socket, chunk).await?;
            }
            socket.write_all(b"0\r\n\r\n").await?;
        }
        Reply::Truncated { chunks } => {
            socket.write_all(chunked_head(200).as_bytes()).await?;
            for chunk in chunks {
                write_chunk(socket, chunk).await?;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Ok(());
        }
        Reply::Stall { status, chunks } => {
            socket.write_all(chunked_head(*status).as_bytes()).await?;
            socket.flush().await?;
            for chunk in chunks {
                write_chunk(socket, chunk).await?;
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Reply::Late { reply, .. } => {
            return Box::pin(write_reply(socket, reply)).await;
        }
    }
    socket.flush().await?;
    socket.shutdown().await
}

/// One callback invocation, in arrival order
#[derive(Debug)]
pub enum Call {
    Text(String),
    Complete(Vec<String>, SuggestionSource),
    Error(StreamError),
    TextEnd,
    Finish,
}

/// Records every callback; optionally cancels after the first fragment
#[derive(Default)]
pub struct Recorder {
    pub calls: Vec<Call>,
    pub cancel_on_text: Option<CancelHandle>,
}

impl Recorder {
    pub fn texts(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<(&[String], SuggestionSource)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Complete(items, source) => Some((items.as_slice(), *source)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&StreamError> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.calls.iter().any(|call| matches!(call, Call::Finish))
    }
}

impl StreamCallbacks for Recorder {
    fn on_text_update(&mut self, fragment: &str) {
        self.calls.push(Call::Text(fragment.to_string()));
        if let Some(cancel) = &self.cancel_on_text {
            cancel.cancel();
        }
    }

    fn on_complete(&mut self, suggestions: Vec<String>, source: SuggestionSource) {
        self.calls.push(Call::Complete(suggestions, source));
    }

    fn on_error(&mut self, error: StreamError) {
        self.calls.push(Call::Error(error));
    }

    fn on_text_end(&mut self) {
        self.calls.push(Call::TextEnd);
    }

    fn on_finish(&mut self) {
        self.calls.push(Call::Finish);
    }
}
