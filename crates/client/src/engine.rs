//! Request pipeline: classify, select, execute.
//!
//! `Engine::plan` is the synchronous half (classification and strategy
//! selection); `Engine::handle` runs the selected executor. The event-driven
//! host calls `handle` once per intercepted request; requests are independent
//! and may run concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use shellcache_core::{
    AppConfig, CacheStorage, Classification, Classifier, Clock, Error, Namespace, RequestDescriptor,
    StrategyDescriptor, StrategySelector,
};

use crate::fetch::{FetchOptions, Network};
use crate::response::Response;
use crate::strategy::{self, NavigationFallback, Outcome, StrategyContext};

/// The cache strategy engine for one namespace.
pub struct Engine {
    classifier: Classifier,
    selector: StrategySelector,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    fallback: Arc<NavigationFallback>,
    navigation_preload: AtomicBool,
}

impl Engine {
    pub fn new(
        classifier: Classifier, selector: StrategySelector, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier,
            selector,
            storage,
            network,
            clock,
            fallback: Arc::new(NavigationFallback::default()),
            navigation_preload: AtomicBool::new(false),
        }
    }

    pub fn with_fallback(mut self, fallback: NavigationFallback) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Build an engine serving `namespace` from application configuration.
    pub fn from_config(
        config: &AppConfig, namespace: &str, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let base = config.app_origin_url()?;
        let shell_document = RequestDescriptor::parse("GET", &config.shell_document, &base)?;
        let fallback = NavigationFallback {
            shell_document: Some(shell_document),
            offline: Response::offline(config.offline_status, config.offline_body.clone()),
        };

        Ok(Self::new(
            Classifier::from_config(config)?,
            StrategySelector::from_config(config, namespace),
            storage,
            network,
            clock,
        )
        .with_fallback(fallback))
    }

    pub fn namespace(&self) -> &str {
        self.selector.namespace()
    }

    /// Add the preload header to navigation fetches from now on.
    pub fn set_navigation_preload(&self, enabled: bool) {
        self.navigation_preload.store(enabled, Ordering::Release);
    }

    pub fn navigation_preload(&self) -> bool {
        self.navigation_preload.load(Ordering::Acquire)
    }

    /// Classify a request and select its strategy. Never suspends.
    pub fn plan(&self, request: &RequestDescriptor) -> (Classification, StrategyDescriptor) {
        let classification = self.classifier.classify(request);
        (classification, self.selector.select(classification))
    }

    /// Run the full pipeline for one request.
    pub async fn handle(&self, request: &RequestDescriptor) -> Result<Outcome, Error> {
        let (classification, descriptor) = self.plan(request);
        tracing::debug!(
            url = %request.url(),
            method = request.method(),
            %classification,
            strategy = %descriptor.kind,
            "handling request"
        );

        let ctx = StrategyContext {
            network: self.network.clone(),
            cache: Namespace::new(self.storage.clone(), self.clock.clone(), descriptor.namespace.clone()),
            options: FetchOptions { navigation_preload: self.navigation_preload() },
            fallback: self.fallback.clone(),
        };

        strategy::execute(&ctx, request, &descriptor).await
    }
}
