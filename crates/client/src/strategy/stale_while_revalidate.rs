//! Stale-while-revalidate with a read-time TTL.
//!
//! A fresh entry is returned at once and a background task refreshes it;
//! the caller never waits on that task and its errors are dropped. An
//! expired or missing entry is refetched before returning.

use std::time::Duration;

use shellcache_core::{Error, RequestDescriptor};
use tokio::task::JoinHandle;

use super::{Outcome, StrategyContext, fetch_and_store};
use crate::response::Response;

pub async fn run(ctx: &StrategyContext, request: &RequestDescriptor, ttl: Option<Duration>) -> Result<Outcome, Error> {
    let Some(entry) = ctx.cache.lookup(request).await else {
        return fetch_and_store(ctx, request).await.map(Outcome::respond);
    };

    if !entry.is_expired(ttl, ctx.cache.now()) {
        let refresh = spawn_refresh(ctx, request);
        return Ok(Outcome::Respond { response: Response::from_entry(entry), refresh: Some(refresh) });
    }

    match fetch_and_store(ctx, request).await {
        Ok(response) => Ok(Outcome::respond(response)),
        Err(e) => {
            tracing::info!(url = %request.url(), error = %e, "refetch of expired entry failed, serving stale");
            Ok(Outcome::respond(Response::from_entry(entry)))
        }
    }
}

fn spawn_refresh(ctx: &StrategyContext, request: &RequestDescriptor) -> JoinHandle<()> {
    let ctx = ctx.clone();
    let request = request.clone();
    tokio::spawn(async move {
        if let Err(e) = fetch_and_store(&ctx, &request).await {
            tracing::debug!(url = %request.url(), error = %e, "background revalidation failed");
        }
    })
}
