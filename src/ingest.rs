use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use reqwest::{header, Client};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError, Receiver, Sender};
use uuid::Uuid;

/// Most events carried by one ingest request.
pub const BATCH_LIMIT: usize = 500;
/// Events buffered between the reader and the sender.
const CHANNEL_CAPACITY: usize = 500;
/// How long the tail sleeps once it has caught up with the file.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(
    name = "humio-ingest",
    version,
    about = "Stream a log file or stdin into a Humio dataspace"
)]
pub struct IngestArgs {
    /// File to tail; stdin is read when omitted.
    pub file: Option<PathBuf>,

    /// Your Humio API token, or a path to a file containing it.
    #[arg(short, long, required = true, env = "HUMIO_API_TOKEN")]
    pub token: String,

    /// The dataspace to stream to.
    #[arg(short, long, default_value = "scratch")]
    pub dataspace: String,

    /// Base URL of the Humio server to stream to.
    #[arg(short, long, default_value = "https://cloud.humio.com/")]
    pub url: String,

    /// Name to find results for this stream by, e.g. @name=MyName. Defaults
    /// to the file name when tailing a file.
    #[arg(short, long)]
    pub name: Option<String>,
}

impl IngestArgs {
    /// Reads the token from a file when the value names one, so secrets can
    /// be kept out of shell history.
    pub fn resolve_token(&self) -> Result<String> {
        if Path::new(&self.token).exists() {
            Ok(std::fs::read_to_string(&self.token)?.trim().to_string())
        } else {
            Ok(self.token.clone())
        }
    }
}

/// One shipped log line.
#[derive(Serialize, Debug, Clone)]
pub struct Event {
    pub timestamp: String,
    pub attributes: HashMap<String, String>,
    pub rawstring: String,
}

/// Wire shape of one entry of the ingest request body.
#[derive(Serialize, Debug)]
struct EventList<'a> {
    tags: HashMap<String, String>,
    events: &'a [Event],
}

/// Per-run identity attached to every shipped event.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: String,
    dataspace: String,
    id: String,
    name: String,
}

impl Session {
    pub fn new(args: &IngestArgs) -> Self {
        let name = match &args.name {
            Some(name) => name.clone(),
            None => args
                .file
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        };
        Self {
            base_url: args.url.trim_end_matches('/').to_string(),
            dataspace: args.dataspace.clone(),
            id: Uuid::new_v4().to_string(),
            name,
        }
    }

    pub fn ingest_url(&self) -> String {
        format!(
            "{}/api/v1/dataspaces/{}/ingest",
            self.base_url, self.dataspace
        )
    }

    /// Where the shipped events can be watched arriving.
    pub fn live_search_url(&self) -> String {
        let key = if self.name.is_empty() {
            format!("@session={}", self.id)
        } else {
            format!("@name={}", self.name)
        };
        format!(
            "{}/{}/search?live=true&start=1d&query={}",
            self.base_url,
            self.dataspace,
            urlencoding::encode(&key)
        )
    }

    pub fn event(&self, line: String) -> Event {
        let mut attributes = HashMap::new();
        attributes.insert("@session".to_string(), self.id.clone());
        attributes.insert("@name".to_string(), self.name.clone());
        Event {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            attributes,
            rawstring: line,
        }
    }
}

pub async fn run(args: IngestArgs) -> Result<()> {
    let token = args.resolve_token()?;
    let session = Session::new(&args);
    let client = build_client(&token)?;

    eprintln!("Follow the stream at {}", session.live_search_url());

    let (events, queue) = mpsc::channel(CHANNEL_CAPACITY);
    let mut sender = tokio::spawn(sender_loop(client, session.clone(), queue));

    let reader = async {
        match &args.file {
            Some(path) => tail_file(&session, path, &events).await,
            None => stream_stdin(&session, &events).await,
        }
    };

    tokio::select! {
        reader_result = reader => {
            // Closing the channel lets the sender drain the final batch.
            drop(events);
            // The sender's error explains a failed send, so it surfaces first.
            sender.await??;
            reader_result
        }
        sender_result = &mut sender => {
            // With the reader still holding the channel open, the sender
            // only finishes early on failure; a tail must not keep polling
            // with nobody left to ship to.
            sender_result??;
            bail!("event sender stopped unexpectedly")
        }
    }
}

fn build_client(token: &str) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    let mut auth_value = header::HeaderValue::from_str(&format!("Bearer {token}"))?;
    auth_value.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, auth_value);

    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(Into::into)
}

/// Collects queued events into batches and ships them. A batch goes out as
/// soon as the queue runs dry or the batch is full.
async fn sender_loop(client: Client, session: Session, mut queue: Receiver<Event>) -> Result<()> {
    let mut batch = Vec::with_capacity(BATCH_LIMIT);
    while let Some(event) = queue.recv().await {
        batch.push(event);
        while batch.len() < BATCH_LIMIT {
            match queue.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        send_batch(&client, &session, &batch).await?;
        batch.clear();
    }
    Ok(())
}

async fn send_batch(client: &Client, session: &Session, events: &[Event]) -> Result<()> {
    log::debug!("sending {} events to {}", events.len(), session.dataspace);
    let list = EventList {
        tags: HashMap::new(),
        events,
    };
    let response = client
        .post(session.ingest_url())
        .json(&[list])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("ingest rejected with {status}: {body}");
    }
    Ok(())
}

/// Reads the file from its beginning, then follows it for appended lines.
async fn tail_file(session: &Session, path: &Path, events: &Sender<Event>) -> Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    loop {
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            tokio::time::sleep(TAIL_POLL_INTERVAL).await;
            continue;
        }
        if !line.ends_with('\n') {
            // Partial line at end of file; keep accumulating.
            continue;
        }
        let text = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        events.send(session.event(text)).await?;
        line.clear();
    }
}

async fn stream_stdin(session: &Session, events: &Sender<Event>) -> Result<()> {
    log::info!("attached to stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        events.send(session.event(line)).await?;
    }
    Ok(())
}
