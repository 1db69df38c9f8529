//! Event handler for the stdio adapter.
//!
//! Each stdin line is one JSON event; each stdout line is one JSON reply.
//!
//! ```text
//! {"event":"install"}
//! {"event":"activate"}
//! {"event":"message","data":{"type":"SKIP_WAITING"}}
//! {"event":"clients_closed"}
//! {"event":"stats"}
//! {"event":"fetch","id":7,"method":"GET","url":"/app.js","destination":"script"}
//! ```
//!
//! Lifecycle events are handled in order as they arrive. Fetch events run
//! concurrently, so their replies may come back out of order; an `id` on the
//! event is echoed on its reply for correlation.
//!
//! A request the worker doesn't intercept gets `{"result":"pass_through"}`
//! and the host sends its original request, body and headers included.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shellcache_client::{ActivationReport, InstallReport, Outcome, Response, ResponseSource, Worker, WorkerState};
use shellcache_core::{RequestDescriptor, ResourceType};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use url::Url;

use crate::error::{AdapterError, ErrorReply};

/// Events accepted on stdin.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Install,
    Activate,
    /// A client message; `data` is a string or an object with a `type` field.
    Message {
        data: Value,
    },
    ClientsClosed,
    /// Report entry counts per namespace.
    Stats,
    Fetch(FetchEvent),
}

/// A request as described by the host.
///
/// Only what classification needs is read. The host keeps the original
/// request for pass-through.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchEvent {
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute, or relative to the app origin.
    pub url: String,

    #[serde(default)]
    pub navigate: bool,

    #[serde(default)]
    pub destination: Option<ResourceType>,
}

fn default_method() -> String {
    "GET".into()
}

#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Option<Value>,

    #[serde(flatten)]
    event: Event,
}

/// Replies written to stdout.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Reply {
    Installed(InstallReport),
    Activated(ActivationReport),
    /// The event was accepted but changed nothing.
    Ignored {
        state: WorkerState,
    },
    Stats {
        current: String,
        namespaces: Vec<NamespaceStat>,
    },
    Response(ResponseReply),
    /// Not intercepted; the host sends the original request unchanged.
    PassThrough,
    Error(ErrorReply),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceStat {
    pub name: String,
    pub entries: usize,
}

impl Reply {
    fn error(err: &AdapterError) -> Self {
        Reply::Error(ErrorReply::from(err))
    }
}

#[derive(Debug, Serialize)]
struct Outgoing {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,

    #[serde(flatten)]
    reply: Reply,
}

/// A response as written to stdout.
///
/// UTF-8 bodies are written as text in `body`; anything else goes hex-encoded
/// in `body_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseReply {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_hex: Option<String>,
    pub source: ResponseSource,
}

impl ResponseReply {
    fn new(response: Response) -> Self {
        let (body, body_hex) = match std::str::from_utf8(&response.body) {
            Ok(text) => (Some(text.to_string()), None),
            Err(_) => (None, Some(hex::encode(&response.body))),
        };
        Self { status: response.status, headers: response.headers, body, body_hex, source: response.source }
    }
}

/// Routes events to the worker.
pub struct EventHandler {
    worker: Worker,
    base: Url,
}

impl EventHandler {
    /// `base` resolves relative request URLs.
    pub fn new(worker: Worker, base: Url) -> Self {
        Self { worker, base }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub async fn dispatch(&self, event: Event) -> Reply {
        let result = match event {
            Event::Install => self.worker.install().await.map(Reply::Installed),
            Event::Activate => self.worker.activate().await.map(Reply::Activated),
            Event::Message { data } => {
                let text = match data {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.worker.on_message(&text).await.map(|r| self.activated_or_ignored(r))
            }
            Event::ClientsClosed => self.worker.clients_closed().await.map(|r| self.activated_or_ignored(r)),
            Event::Stats => self.worker.namespace_stats().await.map(|stats| Reply::Stats {
                current: self.worker.namespace().to_string(),
                namespaces: stats.into_iter().map(|(name, entries)| NamespaceStat { name, entries }).collect(),
            }),
            Event::Fetch(fetch) => return self.fetch(fetch).await,
        };

        result.unwrap_or_else(|e| Reply::error(&AdapterError::from(e)))
    }

    fn activated_or_ignored(&self, report: Option<ActivationReport>) -> Reply {
        match report {
            Some(report) => Reply::Activated(report),
            None => Reply::Ignored { state: self.worker.state() },
        }
    }

    pub async fn fetch(&self, event: FetchEvent) -> Reply {
        match self.try_fetch(event).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "fetch event failed");
                Reply::error(&e)
            }
        }
    }

    async fn try_fetch(&self, event: FetchEvent) -> Result<Reply, AdapterError> {
        let mut request = RequestDescriptor::parse(&event.method, &event.url, &self.base)
            .map_err(shellcache_core::Error::from)?;
        if event.navigate {
            request = request.navigation();
        }
        if let Some(destination) = event.destination {
            request = request.with_destination(destination);
        }

        match self.worker.handle_fetch(&request).await? {
            Outcome::Respond { response, refresh } => {
                if refresh.is_some() {
                    tracing::debug!(url = %request.url(), "background refresh scheduled");
                }
                Ok(Reply::Response(ResponseReply::new(response)))
            }
            Outcome::PassThrough => {
                tracing::debug!(url = %request.url(), method = request.method(), "not intercepted");
                Ok(Reply::PassThrough)
            }
        }
    }
}

fn parse_line(line: &str) -> Result<Incoming, AdapterError> {
    serde_json::from_str(line).map_err(|e| AdapterError::InvalidEvent(e.to_string()))
}

async fn send(tx: &mpsc::Sender<String>, outgoing: Outgoing) {
    match serde_json::to_string(&outgoing) {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                tracing::warn!("output closed, dropping reply");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode reply"),
    }
}

/// Serve events from `input` until EOF, writing replies to `output`.
///
/// Returns the writer once every in-flight fetch has replied.
pub async fn run<R, W>(handler: Arc<EventHandler>, input: R, mut output: W) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(output)
    });

    let mut lines = input.lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Err(e) => {
                tracing::warn!(error = %e, "rejecting event");
                send(&tx, Outgoing { id: None, reply: Reply::error(&e) }).await;
            }
            Ok(Incoming { id, event: Event::Fetch(fetch) }) => {
                let handler = handler.clone();
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let reply = handler.fetch(fetch).await;
                    send(&tx, Outgoing { id, reply }).await;
                });
            }
            Ok(Incoming { id, event }) => {
                let reply = handler.dispatch(event).await;
                send(&tx, Outgoing { id, reply }).await;
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "fetch task failed");
        }
    }

    drop(tx);
    Ok(writer.await??)
}
