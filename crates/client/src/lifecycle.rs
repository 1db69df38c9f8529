//! Lifecycle controller.
//!
//! ```text
//! uninitialized -> installing -> installed (waiting) -> activating -> active
//!                      \
//!                       -> redundant (install failed)
//! ```
//!
//! Install pre-populates the current namespace with the app shell and fails
//! as a whole if any asset can't be fetched or stored. Activation reclaims
//! stale namespaces, turns on navigation preload and claims open clients.
//! A waiting worker activates on the `SKIP_WAITING` control message, when all
//! clients close, or straight after install when configured to.
//!
//! Only an active worker intercepts requests; until then every fetch passes
//! through.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use shellcache_core::{AppConfig, CacheStorage, Clock, Error, Namespace, RequestDescriptor, VersionRegistry};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

use crate::engine::Engine;
use crate::fetch::{FetchOptions, Network};
use crate::response::Response;
use crate::strategy::Outcome;

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninitialized,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Active,
    /// Install failed; this version never activates.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        })
    }
}

/// Control messages accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate a waiting worker now instead of when all clients close.
    SkipWaiting,
}

impl ControlMessage {
    pub const SKIP_WAITING: &'static str = "SKIP_WAITING";

    /// Parse a message: the bare string, a JSON string, or `{"type": "SKIP_WAITING"}`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let text = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(s)) => s,
            Ok(serde_json::Value::Object(map)) => map.get("type")?.as_str()?.to_string(),
            Ok(_) => return None,
            Err(_) => raw.to_string(),
        };
        (text == Self::SKIP_WAITING).then_some(ControlMessage::SkipWaiting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub namespace: String,
    pub cached: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub namespace: String,
    pub reclaimed: usize,
    pub navigation_preload: bool,
    pub clients_claimed: bool,
}

/// Owns one version of the engine through its lifecycle.
pub struct Worker {
    tag: String,
    registry: VersionRegistry,
    cache: Namespace,
    network: Arc<dyn Network>,
    engine: Engine,
    shell: Vec<RequestDescriptor>,
    navigation_preload: bool,
    skip_waiting_on_install: bool,
    skip_waiting_requested: AtomicBool,
    clients_claimed: AtomicBool,
    state: watch::Sender<WorkerState>,
    transitions: Mutex<()>,
}

impl Worker {
    /// Build a worker for the configured version tag.
    pub fn from_config(
        config: &AppConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>, clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let base = config.app_origin_url()?;
        let registry = VersionRegistry::new(storage.clone(), config.namespace_prefix.clone());
        let namespace = registry.current_namespace(&config.version_tag);
        let shell = config
            .app_shell
            .iter()
            .map(|path| RequestDescriptor::parse("GET", path, &base).map_err(Error::from))
            .collect::<Result<Vec<_>, _>>()?;
        let engine = Engine::from_config(config, &namespace, storage.clone(), network.clone(), clock.clone())?;

        Ok(Self {
            tag: config.version_tag.clone(),
            registry,
            cache: Namespace::new(storage, clock, namespace),
            network,
            engine,
            shell,
            navigation_preload: config.navigation_preload,
            skip_waiting_on_install: config.skip_waiting_on_install,
            skip_waiting_requested: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            state: watch::channel(WorkerState::Uninitialized).0,
            transitions: Mutex::new(()),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state changes, e.g. to tell clients a new version is waiting.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn namespace(&self) -> &str {
        self.cache.name()
    }

    pub fn version_tag(&self) -> &str {
        &self.tag
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    /// Entry counts for every namespace in the store, current or stale.
    pub async fn namespace_stats(&self) -> Result<Vec<(String, usize)>, Error> {
        self.registry.namespace_stats().await
    }

    fn transition(&self, to: WorkerState) {
        let from = self.state.send_replace(to);
        tracing::info!(version = %self.tag, %from, %to, "worker state changed");
    }

    fn expect_state(&self, expected: WorkerState) -> Result<(), Error> {
        let actual = self.state();
        if actual != expected {
            return Err(Error::InvalidState { expected: expected.to_string(), actual: actual.to_string() });
        }
        Ok(())
    }

    /// Install this version: fetch every app-shell asset, then store them.
    ///
    /// Any fetch failure or non-2xx status fails the install and leaves the
    /// worker redundant. Nothing is written until every asset has been fetched.
    ///
    /// A pending skip-waiting request is honoured before the transition lock
    /// is released, so no other caller can observe the waiting state first.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let _guard = self.transitions.lock().await;
        self.expect_state(WorkerState::Uninitialized)?;
        self.transition(WorkerState::Installing);

        let cached = match self.populate_shell().await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::error!(version = %self.tag, error = %e, "install failed");
                self.transition(WorkerState::Redundant);
                return Err(e);
            }
        };
        self.transition(WorkerState::Installed);

        if self.skip_waiting_on_install || self.skip_waiting_requested.load(Ordering::SeqCst) {
            self.activate_locked().await;
        }

        Ok(InstallReport { namespace: self.namespace().to_string(), cached })
    }

    async fn populate_shell(&self) -> Result<usize, Error> {
        let mut join_set = JoinSet::new();
        for (index, request) in self.shell.iter().cloned().enumerate() {
            let network = self.network.clone();
            join_set.spawn(async move {
                let result = network.fetch(&request, FetchOptions::default()).await;
                (index, request, result)
            });
        }

        let mut fetched: Vec<Option<(RequestDescriptor, Response)>> = vec![None; self.shell.len()];
        while let Some(joined) = join_set.join_next().await {
            let (index, request, result) = joined.map_err(|e| Error::InstallFailed {
                asset: "app shell".into(),
                reason: e.to_string(),
            })?;

            let failure = match result {
                Ok(response) if response.is_success() => {
                    fetched[index] = Some((request, response));
                    continue;
                }
                Ok(response) => format!("status {}", response.status),
                Err(e) => e.to_string(),
            };

            join_set.shutdown().await;
            return Err(Error::InstallFailed { asset: request.url().path().to_string(), reason: failure });
        }

        self.cache.open().await?;
        let mut cached = 0;
        for (request, response) in fetched.into_iter().flatten() {
            self.cache
                .put(&request, response.to_entry())
                .await
                .map_err(|e| Error::InstallFailed { asset: request.url().path().to_string(), reason: e.to_string() })?;
            cached += 1;
        }

        tracing::info!(namespace = %self.namespace(), cached, "app shell pre-populated");
        Ok(cached)
    }

    /// Activate an installed worker.
    ///
    /// Failing to reclaim stale namespaces is logged and does not block
    /// activation; the stale data is retried on the next activation.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        let _guard = self.transitions.lock().await;
        self.expect_state(WorkerState::Installed)?;
        Ok(self.activate_locked().await)
    }

    /// Activate when installed, otherwise do nothing. Checked under the lock.
    async fn activate_if_waiting(&self) -> Option<ActivationReport> {
        let _guard = self.transitions.lock().await;
        match self.state() {
            WorkerState::Installed => Some(self.activate_locked().await),
            _ => None,
        }
    }

    /// Caller holds `transitions` and has seen `Installed`.
    async fn activate_locked(&self) -> ActivationReport {
        self.transition(WorkerState::Activating);

        let reclaimed = match self.registry.reclaim_stale(&self.tag).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(version = %self.tag, error = %e, "failed to reclaim stale namespaces");
                0
            }
        };

        if self.navigation_preload {
            self.engine.set_navigation_preload(true);
        }

        self.clients_claimed.store(true, Ordering::Release);
        tracing::info!(version = %self.tag, "claimed open clients");

        self.transition(WorkerState::Active);

        ActivationReport {
            namespace: self.namespace().to_string(),
            reclaimed,
            navigation_preload: self.engine.navigation_preload(),
            clients_claimed: true,
        }
    }

    /// Activate now if waiting. While installing, activation follows install.
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>, Error> {
        self.skip_waiting_requested.store(true, Ordering::SeqCst);
        match self.state() {
            WorkerState::Installed => Ok(self.activate_if_waiting().await),
            state => {
                tracing::debug!(version = %self.tag, %state, "skip waiting outside installed state");
                Ok(None)
            }
        }
    }

    /// Handle a client message. Unrecognized messages are ignored.
    pub async fn on_message(&self, raw: &str) -> Result<Option<ActivationReport>, Error> {
        match ControlMessage::parse(raw) {
            Some(ControlMessage::SkipWaiting) => self.skip_waiting().await,
            None => {
                tracing::debug!(message = raw, "ignoring unrecognized message");
                Ok(None)
            }
        }
    }

    /// All clients of the previous version closed; a waiting worker activates.
    pub async fn clients_closed(&self) -> Result<Option<ActivationReport>, Error> {
        if self.state() != WorkerState::Installed {
            return Ok(None);
        }
        Ok(self.activate_if_waiting().await)
    }

    /// Intercept a request. Non-active workers pass everything through.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Result<Outcome, Error> {
        if self.state() != WorkerState::Active {
            return Ok(Outcome::PassThrough);
        }
        self.engine.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseSource;
    use crate::testing::{StubNetwork, get};
    use shellcache_core::{ManualClock, MemoryStore};

    fn config(shell: &[&str]) -> AppConfig {
        AppConfig {
            app_origin: "https://app.example.com".into(),
            app_shell: shell.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn worker(config: &AppConfig, store: Arc<MemoryStore>, network: Arc<StubNetwork>) -> Worker {
        Worker::from_config(config, store, network, Arc::new(ManualClock::new(chrono::Utc::now()))).unwrap()
    }

    fn shell_network() -> Arc<StubNetwork> {
        let network = Arc::new(StubNetwork::default());
        network.route("/", 200, "<html>root</html>");
        network.route("/index.html", 200, "<html>index</html>");
        network
    }

    #[tokio::test]
    async fn test_install_populates_namespace() {
        let store = Arc::new(MemoryStore::new());
        let worker = worker(&config(&["/", "/index.html"]), store.clone(), shell_network());

        let report = worker.install().await.unwrap();
        assert_eq!(report, InstallReport { namespace: "v1".into(), cached: 2 });
        assert_eq!(worker.state(), WorkerState::Installed);
        assert_eq!(store.count("v1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_install_failure_is_redundant_and_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let network = shell_network();
        let worker = worker(&config(&["/", "/index.html", "/icon-192.png"]), store.clone(), network);

        let result = worker.install().await;
        assert!(matches!(result, Err(Error::InstallFailed { ref asset, .. }) if asset == "/icon-192.png"));
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert_eq!(store.count("v1").await.unwrap(), 0);

        assert!(matches!(worker.activate().await, Err(Error::InvalidState { .. })));
        assert!(matches!(worker.skip_waiting().await, Ok(None)));
        assert_eq!(worker.state(), WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_install_offline_fails() {
        let network = shell_network();
        network.set_offline(true);
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), network);

        assert!(matches!(worker.install().await, Err(Error::InstallFailed { .. })));
        assert_eq!(worker.state(), WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network());
        worker.install().await.unwrap();
        assert!(matches!(worker.install().await, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_activate_reclaims_only_stale() {
        let store = Arc::new(MemoryStore::new());
        store.open("v0").await.unwrap();
        store.open("v1").await.unwrap();
        let worker = worker(&config(&["/"]), store.clone(), shell_network());
        worker.install().await.unwrap();

        let report = worker.activate().await.unwrap();
        assert_eq!(report.reclaimed, 1);
        assert!(report.clients_claimed);
        assert!(report.navigation_preload);
        assert_eq!(store.namespaces().await.unwrap(), vec!["v1".to_string()]);
        assert_eq!(worker.state(), WorkerState::Active);
        assert!(worker.clients_claimed());
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network());
        assert!(matches!(worker.activate().await, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_waiting_worker_passes_through() {
        let network = shell_network();
        let worker = worker(&config(&["/", "/index.html"]), Arc::new(MemoryStore::new()), network.clone());
        worker.install().await.unwrap();
        let calls = network.calls();

        let outcome = worker.handle_fetch(&get("/index.html").navigation()).await.unwrap();
        assert!(matches!(outcome, Outcome::PassThrough));
        assert_eq!(network.calls(), calls);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates() {
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network());
        worker.install().await.unwrap();

        assert!(worker.on_message("hello").await.unwrap().is_none());
        assert_eq!(worker.state(), WorkerState::Installed);

        let report = worker.on_message(r#"{"type":"SKIP_WAITING"}"#).await.unwrap();
        assert!(report.is_some());
        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_before_install_activates_after() {
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network());
        assert!(worker.skip_waiting().await.unwrap().is_none());

        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_during_install_activates_once() {
        let network = shell_network();
        let gate = network.hold();
        let worker = Arc::new(worker(&config(&["/"]), Arc::new(MemoryStore::new()), network));
        let mut states = worker.subscribe();

        let installing = tokio::spawn({
            let worker = worker.clone();
            async move { worker.install().await }
        });
        states.wait_for(|state| *state == WorkerState::Installing).await.unwrap();

        assert!(worker.skip_waiting().await.unwrap().is_none());
        gate.notify_one();

        let report = installing.await.unwrap().unwrap();
        assert_eq!(report.cached, 1);
        assert_eq!(worker.state(), WorkerState::Active);
        assert!(worker.clients_closed().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_install_and_skip_waiting_race_never_errors() {
        for _ in 0..50 {
            let worker = Arc::new(worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network()));
            let other = worker.clone();

            let (installed, skipped) = tokio::join!(
                tokio::spawn({
                    let worker = worker.clone();
                    async move { worker.install().await }
                }),
                tokio::spawn(async move { other.skip_waiting().await }),
            );
            installed.unwrap().unwrap();
            skipped.unwrap().unwrap();
            assert_eq!(worker.state(), WorkerState::Active);
        }
    }

    #[tokio::test]
    async fn test_namespace_stats_after_activation() {
        let store = Arc::new(MemoryStore::new());
        store.open("v0").await.unwrap();
        let worker = worker(&config(&["/", "/index.html"]), store, shell_network());
        worker.install().await.unwrap();
        assert_eq!(
            worker.namespace_stats().await.unwrap(),
            vec![("v0".to_string(), 0), ("v1".to_string(), 2)]
        );

        worker.activate().await.unwrap();
        assert_eq!(worker.namespace_stats().await.unwrap(), vec![("v1".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_skip_waiting_on_install_config() {
        let config = AppConfig { skip_waiting_on_install: true, ..config(&["/"]) };
        let worker = worker(&config, Arc::new(MemoryStore::new()), shell_network());
        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_clients_closed_activates_waiting_worker() {
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network());
        assert!(worker.clients_closed().await.unwrap().is_none());
        worker.install().await.unwrap();
        assert!(worker.clients_closed().await.unwrap().is_some());
        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_subscribe_sees_transitions() {
        let worker = worker(&config(&["/"]), Arc::new(MemoryStore::new()), shell_network());
        let mut rx = worker.subscribe();
        worker.install().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_cached_index() {
        let network = shell_network();
        let worker = worker(&config(&["/", "/index.html"]), Arc::new(MemoryStore::new()), network.clone());
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        network.set_offline(true);

        let outcome = worker.handle_fetch(&get("/index.html").navigation()).await.unwrap();
        let response = outcome.response().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"<html>index</html>");
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_offline_navigation_without_document_gets_placeholder() {
        let network = Arc::new(StubNetwork::default());
        network.route("/manifest.webmanifest", 200, "{}");
        let config = AppConfig { shell_document: "/index.html".into(), ..config(&["/manifest.webmanifest"]) };
        let worker = worker(&config, Arc::new(MemoryStore::new()), network.clone());
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        network.set_offline(true);

        let outcome = worker.handle_fetch(&get("/").navigation()).await.unwrap();
        let response = outcome.response().unwrap();
        assert_eq!(response.source, ResponseSource::Offline);
        assert_eq!(response.status, 503);
    }

    #[test]
    fn test_control_message_parse() {
        assert_eq!(ControlMessage::parse("SKIP_WAITING"), Some(ControlMessage::SkipWaiting));
        assert_eq!(ControlMessage::parse("\"SKIP_WAITING\""), Some(ControlMessage::SkipWaiting));
        assert_eq!(ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#), Some(ControlMessage::SkipWaiting));
        assert_eq!(ControlMessage::parse(r#"{"type":"PING"}"#), None);
        assert_eq!(ControlMessage::parse("42"), None);
        assert_eq!(ControlMessage::parse("skip_waiting"), None);
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::Installed.to_string(), "installed");
        assert_eq!(WorkerState::Redundant.to_string(), "redundant");
    }
}
