//! Strategy executors.
//!
//! Each executor reads and writes only the namespace it is handed and never
//! deletes entries; expiry is decided at read time from the stored stamp.
//!
//! | Strategy | Hit | Miss | Network failure |
//! |----------|-----|------|-----------------|
//! | cache-first | return entry | fetch, store, return | error on miss |
//! | network-first | (not read first) | fetch, store, return | entry, then shell document / offline page for navigations |
//! | stale-while-revalidate | return entry, refresh in background | fetch, store, return | stale entry if any |
//! | pass-through | - | - | - |

pub mod cache_first;
pub mod network_first;
pub mod stale_while_revalidate;

use std::sync::Arc;

use shellcache_core::{Error, Namespace, RequestDescriptor, StrategyDescriptor, StrategyKind};
use tokio::task::JoinHandle;

use crate::fetch::{FetchOptions, Network};
use crate::response::Response;

/// Fallbacks for navigations when both network and the request's own entry fail.
#[derive(Debug, Clone)]
pub struct NavigationFallback {
    /// Stored app-shell document to serve in place of any page.
    pub shell_document: Option<RequestDescriptor>,
    /// Fixed placeholder with a non-2xx status.
    pub offline: Response,
}

impl Default for NavigationFallback {
    fn default() -> Self {
        Self { shell_document: None, offline: Response::offline(503, "offline") }
    }
}

/// Everything an executor needs for one request.
#[derive(Clone)]
pub struct StrategyContext {
    pub network: Arc<dyn Network>,
    pub cache: Namespace,
    pub options: FetchOptions,
    pub fallback: Arc<NavigationFallback>,
}

/// Result of running the pipeline on one request.
#[derive(Debug)]
pub enum Outcome {
    /// The request is not intercepted and proceeds to the network untouched.
    PassThrough,
    /// The engine answers the request.
    Respond {
        response: Response,
        /// Background revalidation still in flight. Callers don't wait on it.
        refresh: Option<JoinHandle<()>>,
    },
}

impl Outcome {
    pub fn respond(response: Response) -> Self {
        Outcome::Respond { response, refresh: None }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Outcome::PassThrough => None,
            Outcome::Respond { response, .. } => Some(response),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Outcome::PassThrough => None,
            Outcome::Respond { response, .. } => Some(response),
        }
    }
}

/// Run the executor named by `descriptor`.
pub async fn execute(
    ctx: &StrategyContext, request: &RequestDescriptor, descriptor: &StrategyDescriptor,
) -> Result<Outcome, Error> {
    match descriptor.kind {
        StrategyKind::PassThrough => Ok(Outcome::PassThrough),
        StrategyKind::CacheFirst => cache_first::run(ctx, request).await.map(Outcome::respond),
        StrategyKind::NetworkFirst => network_first::run(ctx, request).await.map(Outcome::respond),
        StrategyKind::StaleWhileRevalidate => stale_while_revalidate::run(ctx, request, descriptor.ttl).await,
    }
}

/// Fetch from the network and store a successful result.
pub(crate) async fn fetch_and_store(ctx: &StrategyContext, request: &RequestDescriptor) -> Result<Response, Error> {
    let response = ctx.network.fetch(request, ctx.options).await?;
    ctx.cache.store(request, response.to_entry()).await;
    Ok(response)
}
