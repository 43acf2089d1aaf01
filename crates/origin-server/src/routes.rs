use gatehouse_cache::{CacheStats, SharedLru};
use gatehouse_net::{Response, Router, ServerMetrics};
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::service::CachedResponse;

/// Built-in routes. `/stats` exposes the counters and cache state as
/// JSON; everything else is a small demo surface for the cache to chew
/// on.
pub fn build_router(
    metrics: Arc<ServerMetrics>,
    cache: Arc<SharedLru<CachedResponse>>,
) -> Router {
    let mut router = Router::new();

    router.get("/", |_| {
        Ok(Response::ok_text("gatehouse origin server"))
    });

    router.get("/healthz", |_| Ok(Response::ok_text("ok")));

    router.get("/time", |_| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let body = json!({ "epoch_millis": now.as_millis() as u64 });
        Ok(Response::ok_json(body.to_string()))
    });

    router.post("/echo", |req| Ok(Response::ok_bytes(req.body.clone())));

    router.get("/stats", move |_| {
        let s = metrics.snapshot();
        let c: CacheStats = cache.stats();
        let body = json!({
            "server": s,
            "cache": {
                "hits": c.hits,
                "misses": c.misses,
                "evictions": c.evictions,
                "expired": c.expired,
                "current_size": c.current_size,
                "capacity": c.capacity,
            },
        });
        let mut resp = Response::ok_json(body.to_string());
        // Counters must always be current, never a cached snapshot
        resp.headers.set("Cache-Control", "no-store");
        Ok(resp)
    });

    router
}
