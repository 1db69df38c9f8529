//! Test doubles shared by the client unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use shellcache_core::{CachedEntry, Error, ManualClock, MemoryStore, Namespace, RequestDescriptor};
use tokio::sync::Notify;
use url::Url;

use crate::fetch::{FetchOptions, Network};
use crate::response::Response;
use crate::strategy::{NavigationFallback, StrategyContext};

pub(crate) const ORIGIN: &str = "https://app.example.com/";

pub(crate) fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub(crate) fn get(path: &str) -> RequestDescriptor {
    RequestDescriptor::parse("GET", path, &origin()).unwrap()
}

/// Scripted network: fixed routes, an offline switch and an optional gate
/// that holds every fetch until notified.
#[derive(Default)]
pub(crate) struct StubNetwork {
    routes: Mutex<HashMap<String, (u16, Bytes)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    last_options: Mutex<Option<FetchOptions>>,
}

impl StubNetwork {
    pub(crate) fn route(&self, path: &str, status: u16, body: &str) {
        let url = origin().join(path).unwrap().to_string();
        self.routes.lock().unwrap().insert(url, (status, Bytes::from(body.to_string())));
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_options(&self) -> Option<FetchOptions> {
        *self.last_options.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &RequestDescriptor, options: FetchOptions) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url())));
        }

        let route = self.routes.lock().unwrap().get(request.url().as_str()).cloned();
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/octet-stream".to_string());
        Ok(match route {
            Some((status, body)) => Response::network(status, headers, body),
            None => Response::network(404, headers, "not found"),
        })
    }
}

/// A namespace over an in-memory store, a manual clock and a stub network.
pub(crate) struct Harness {
    pub(crate) network: Arc<StubNetwork>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) namespace: Namespace,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let network = Arc::new(StubNetwork::default());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let namespace = Namespace::new(store.clone(), clock.clone(), "v1");
        Self { network, store, clock, namespace }
    }

    pub(crate) fn context(&self) -> StrategyContext {
        StrategyContext {
            network: self.network.clone(),
            cache: self.namespace.clone(),
            options: FetchOptions::default(),
            fallback: Arc::new(NavigationFallback {
                shell_document: Some(get("/index.html")),
                offline: Response::offline(503, "offline"),
            }),
        }
    }

    pub(crate) async fn seed(&self, request: &RequestDescriptor, body: &str) {
        self.namespace
            .put(request, CachedEntry::new(200, BTreeMap::new(), body.to_string()))
            .await
            .unwrap();
    }

    pub(crate) async fn cached_body(&self, request: &RequestDescriptor) -> Option<Bytes> {
        self.namespace.lookup(request).await.map(|entry| entry.body)
    }
}
