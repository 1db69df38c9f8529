//! Cache-first: serve the stored entry without touching the network.

use shellcache_core::{Error, RequestDescriptor};

use super::{StrategyContext, fetch_and_store};
use crate::response::Response;

pub async fn run(ctx: &StrategyContext, request: &RequestDescriptor) -> Result<Response, Error> {
    if let Some(entry) = ctx.cache.lookup(request).await {
        return Ok(Response::from_entry(entry));
    }
    fetch_and_store(ctx, request).await
}
