use bytes::Bytes;
use gatehouse_cache::SharedLru;
use gatehouse_net::server::RequestHandler;
use gatehouse_net::wire::{self, Request, Response};
use gatehouse_net::{Router, ServeError, ServerMetrics};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// A successful response retained for replay: status is always 200, so
/// only the headers and body are stored.
pub struct CachedResponse {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Origin request handler: GET responses are looked up in the response
/// cache under `"METHOD path"` before the routing table runs. Only 200
/// responses with bodies under the configured cap are stored; a handler
/// opts out with `Cache-Control: no-store`. Non-GET requests always
/// reach their handler.
pub struct OriginService {
    router: Router,
    cache: Arc<SharedLru<CachedResponse>>,
    metrics: Arc<ServerMetrics>,
    ttl: Duration,
    max_body_bytes: usize,
    server_name: String,
}

impl OriginService {
    pub fn new(
        router: Router,
        cache: Arc<SharedLru<CachedResponse>>,
        metrics: Arc<ServerMetrics>,
        ttl: Duration,
        max_body_bytes: usize,
        server_name: String,
    ) -> Self {
        Self {
            router,
            cache,
            metrics,
            ttl,
            max_body_bytes,
            server_name,
        }
    }

    fn respond(&self, req: &Request) -> Response {
        if req.method != "GET" {
            return self.router.dispatch(req);
        }

        let key = format!("{} {}", req.method, req.path);
        if let Some(hit) = self.cache.get(&key) {
            self.metrics.inc_cache_hits();
            let mut resp = Response::new(200, "OK");
            for (k, v) in &hit.headers {
                resp.headers.set(k.clone(), v.clone());
            }
            resp.headers.set("X-Cache", "HIT");
            resp.body = hit.body.clone();
            return resp;
        }

        self.metrics.inc_cache_misses();
        let mut resp = self.router.dispatch(req);
        let no_store = resp
            .headers
            .get("Cache-Control")
            .is_some_and(|v| v.to_ascii_lowercase().contains("no-store"));
        if resp.status == 200 && !no_store && resp.body.len() < self.max_body_bytes {
            // Store before stamping X-Cache, so a replay says HIT
            self.cache.insert(
                key,
                CachedResponse {
                    headers: resp
                        .headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body: resp.body.clone(),
                },
                self.ttl,
            );
            self.metrics.inc_cache_stores();
        }
        resp.headers.set("X-Cache", "MISS");
        resp
    }
}

impl RequestHandler for OriginService {
    fn handle(&self, req: Request, conn: &mut TcpStream) -> Result<u16, ServeError> {
        let resp = self.respond(&req);
        wire::write_response(conn, &resp, &self.server_name, true)?;
        Ok(resp.status)
    }
}
