#![allow(dead_code)]

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Path to the compiled `humio` binary, for tests that drive a real process.
pub fn humio_binary() -> &'static str {
    env!("CARGO_BIN_EXE_humio")
}

/// One scripted piece of a response body, written after an optional pause.
pub struct Chunk {
    pub delay: Duration,
    pub data: String,
}

impl Chunk {
    pub fn new(data: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            data: data.to_string(),
        }
    }

    pub fn after(delay_ms: u64, data: &str) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            data: data.to_string(),
        }
    }
}

enum Script {
    Plain {
        status: u16,
        reason: String,
        body: String,
    },
    Chunked {
        status: u16,
        reason: String,
        chunks: Vec<Chunk>,
        terminated: bool,
    },
}

/// Serves exactly one scripted HTTP response on a loopback port and records
/// the request it got.
pub struct StubServer {
    port: u16,
    handle: JoinHandle<Request>,
}

impl StubServer {
    /// Responds with a fixed-length body.
    pub async fn plain(status: u16, reason: &str, body: &str) -> Self {
        Self::start(Script::Plain {
            status,
            reason: reason.to_string(),
            body: body.to_string(),
        })
        .await
    }

    /// Responds with a chunked body, one transfer chunk per scripted piece.
    pub async fn chunked(status: u16, reason: &str, chunks: Vec<Chunk>) -> Self {
        Self::start(Script::Chunked {
            status,
            reason: reason.to_string(),
            chunks,
            terminated: true,
        })
        .await
    }

    /// Like `chunked`, but drops the connection before the final terminator.
    pub async fn chunked_cut_short(status: u16, reason: &str, chunks: Vec<Chunk>) -> Self {
        Self::start(Script::Chunked {
            status,
            reason: reason.to_string(),
            chunks,
            terminated: false,
        })
        .await
    }

    async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(serve(listener, script));
        Self { port, handle }
    }

    pub fn hostport(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Waits for the exchange to finish and returns what the client sent.
    pub async fn request(self) -> Request {
        self.handle.await.expect("Stub server task failed")
    }
}

/// A loopback hostport with nothing listening behind it.
pub async fn closed_hostport() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{port}")
}

/// Accepts one request and then goes silent, leaving the client waiting on a
/// response that never comes. The returned receiver fires once the request
/// has been read.
pub async fn stalled_server() -> (String, oneshot::Receiver<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (arrived, request) = oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = arrived.send(read_request(&mut stream).await);
        // Keep the connection open so the client stays parked on the read.
        std::future::pending::<()>().await;
    });
    (format!("127.0.0.1:{port}"), request)
}

async fn serve(listener: TcpListener, script: Script) -> Request {
    let (mut stream, _) = listener.accept().await.unwrap();
    let request = read_request(&mut stream).await;

    match script {
        Script::Plain {
            status,
            reason,
            body,
        } => {
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        }
        Script::Chunked {
            status,
            reason,
            chunks,
            terminated,
        } => {
            let head = format!("HTTP/1.1 {status} {reason}\r\nTransfer-Encoding: chunked\r\n\r\n");
            stream.write_all(head.as_bytes()).await.unwrap();
            for chunk in chunks {
                if !chunk.delay.is_zero() {
                    tokio::time::sleep(chunk.delay).await;
                }
                let framed = format!("{:x}\r\n{}\r\n", chunk.data.len(), chunk.data);
                stream.write_all(framed.as_bytes()).await.unwrap();
                stream.flush().await.unwrap();
            }
            if terminated {
                stream.write_all(b"0\r\n\r\n").await.unwrap();
            }
        }
    }

    stream.flush().await.unwrap();
    request
}

async fn read_request(stream: &mut TcpStream) -> Request {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let (head, mut body) = loop {
        let read = stream.read(&mut buf).await.unwrap();
        assert!(read > 0, "client closed before sending a full request");
        raw.extend_from_slice(&buf[..read]);
        if let Some(split) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8(raw[..split].to_vec()).unwrap();
            break (head, raw[split + 4..].to_vec());
        }
    };

    let length = header_value(&head, "content-length")
        .map(|value| value.parse::<usize>().unwrap())
        .unwrap_or(0);
    while body.len() < length {
        let read = stream.read(&mut buf).await.unwrap();
        assert!(read > 0, "client closed mid-body");
        body.extend_from_slice(&buf[..read]);
    }

    Request {
        head,
        body: String::from_utf8(body).unwrap(),
    }
}

pub fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// What the client sent, split into head and body.
pub struct Request {
    pub head: String,
    pub body: String,
}

impl Request {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.head, name)
    }
}
