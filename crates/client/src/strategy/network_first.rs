//! Network-first: always try the network, fall back to the store on failure.
//!
//! Navigations fall back further, to the stored shell document and finally
//! to the offline placeholder, so a page load never ends in a bare network
//! error.

use shellcache_core::{Error, RequestDescriptor};

use super::{StrategyContext, fetch_and_store};
use crate::response::Response;

pub async fn run(ctx: &StrategyContext, request: &RequestDescriptor) -> Result<Response, Error> {
    let err = match fetch_and_store(ctx, request).await {
        Ok(response) => return Ok(response),
        Err(e) => e,
    };

    tracing::info!(url = %request.url(), error = %err, "network failed, falling back to cache");

    if let Some(entry) = ctx.cache.lookup(request).await {
        return Ok(Response::from_entry(entry));
    }

    if !request.is_document() {
        return Err(err);
    }

    if let Some(shell) = &ctx.fallback.shell_document
        && shell.url() != request.url()
        && let Some(entry) = ctx.cache.lookup(shell).await
    {
        return Ok(Response::from_entry(entry));
    }

    tracing::warn!(url = %request.url(), "no stored document, serving offline placeholder");
    Ok(ctx.fallback.offline.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseSource;
    use crate::testing::{Harness, get};

    #[tokio::test]
    async fn test_success_stores_and_returns_fresh() {
        let harness = Harness::new();
        harness.network.route("/exec", 200, "fresh");
        let req = get("/exec");
        harness.seed(&req, "old").await;

        let response = run(&harness.context(), &req).await.unwrap();
        assert_eq!(response.body.as_ref(), b"fresh");
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(harness.cached_body(&req).await.as_deref(), Some(&b"fresh"[..]));
    }

    #[tokio::test]
    async fn test_http_error_is_not_a_failure() {
        let harness = Harness::new();
        harness.network.route("/exec", 500, "boom");
        let req = get("/exec");
        harness.seed(&req, "old").await;

        let response = run(&harness.context(), &req).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(harness.cached_body(&req).await.as_deref(), Some(&b"old"[..]));
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_entry() {
        let harness = Harness::new();
        harness.network.set_offline(true);
        let req = get("/exec");
        harness.seed(&req, "old").await;

        let response = run(&harness.context(), &req).await.unwrap();
        assert_eq!(response.body.as_ref(), b"old");
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_offline_without_entry_fails_for_non_documents() {
        let harness = Harness::new();
        harness.network.set_offline(true);

        let result = run(&harness.context(), &get("/exec")).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_offline_navigation_served_cached_index() {
        let harness = Harness::new();
        harness.network.set_offline(true);
        harness.seed(&get("/index.html"), "<html>shell</html>").await;

        let response = run(&harness.context(), &get("/index.html").navigation()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_to_other_route_gets_shell() {
        let harness = Harness::new();
        harness.network.set_offline(true);
        harness.seed(&get("/index.html"), "<html>shell</html>").await;

        let response = run(&harness.context(), &get("/orders/42").navigation()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_document_gets_placeholder() {
        let harness = Harness::new();
        harness.network.set_offline(true);

        let response = run(&harness.context(), &get("/").navigation()).await.unwrap();
        assert_eq!(response.source, ResponseSource::Offline);
        assert!(!response.is_success());
    }
}
