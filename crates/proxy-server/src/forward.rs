use bytes::Bytes;
use gatehouse_cache::SharedLru;
use gatehouse_net::server::RequestHandler;
use gatehouse_net::wire::{self, Request, Response};
use gatehouse_net::{ServeError, ServerMetrics};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Forward-proxy request handler.
///
/// The target comes from the `Host` header. Cached GET responses are
/// relayed byte-for-byte under `"METHOD:host:port:path"`; a miss opens
/// a fresh upstream connection, forwards the request verbatim, and
/// drains the upstream to EOF (upstream connections are single-shot,
/// so EOF delimits the response). Upstream failures map to 502, a slow
/// upstream to 504; both are responses to the client, not connection
/// errors.
pub struct ProxyService {
    cache: Arc<SharedLru<Bytes>>,
    metrics: Arc<ServerMetrics>,
    ttl: Duration,
    max_body_bytes: usize,
    connect_timeout: Duration,
    upstream_read_timeout: Duration,
    server_name: String,
}

impl ProxyService {
    pub fn new(
        cache: Arc<SharedLru<Bytes>>,
        metrics: Arc<ServerMetrics>,
        ttl: Duration,
        max_body_bytes: usize,
        connect_timeout: Duration,
        upstream_read_timeout: Duration,
        server_name: String,
    ) -> Self {
        Self {
            cache,
            metrics,
            ttl,
            max_body_bytes,
            connect_timeout,
            upstream_read_timeout,
            server_name,
        }
    }

    fn fetch_upstream(&self, req: &Request, host: &str, port: u16) -> Result<Bytes, ServeError> {
        let addr = format!("{host}:{port}");
        let resolved = addr
            .to_socket_addrs()
            .map_err(|e| ServeError::UpstreamConnect {
                addr: addr.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| ServeError::UpstreamConnect {
                addr: addr.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            })?;

        let mut upstream = TcpStream::connect_timeout(&resolved, self.connect_timeout)
            .map_err(|e| ServeError::UpstreamConnect {
                addr: addr.clone(),
                source: e,
            })?;
        upstream.set_read_timeout(Some(self.upstream_read_timeout))?;

        req.write_wire(&mut upstream)?;

        let mut response = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match upstream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(ServeError::UpstreamTimeout)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Bytes::from(response))
    }
}

impl RequestHandler for ProxyService {
    fn handle(&self, req: Request, conn: &mut TcpStream) -> Result<u16, ServeError> {
        let (host, port) = match req.target() {
            Some(target) => target,
            None => {
                self.metrics.inc_bad_requests();
                let resp = Response::bad_request("Missing or invalid Host header");
                wire::write_response(conn, &resp, &self.server_name, false)?;
                return Ok(400);
            }
        };

        let key = format!("{}:{}:{}:{}", req.method, host, port, req.path);
        let cacheable = req.method == "GET";

        if cacheable {
            if let Some(raw) = self.cache.get(&key) {
                self.metrics.inc_cache_hits();
                conn.write_all(&raw)?;
                conn.flush()?;
                return Ok(parse_status(&raw).unwrap_or(502));
            }
            self.metrics.inc_cache_misses();
        }

        let raw = match self.fetch_upstream(&req, &host, port) {
            Ok(raw) => raw,
            Err(ServeError::UpstreamTimeout) => {
                self.metrics.inc_timeouts();
                tracing::warn!(%host, port, path = %req.path, "upstream timed out");
                let resp = Response::gateway_timeout("Upstream timed out");
                wire::write_response(conn, &resp, &self.server_name, false)?;
                return Ok(504);
            }
            Err(ServeError::UpstreamConnect { addr, source }) => {
                self.metrics.inc_errors();
                tracing::warn!(%addr, error = %source, "upstream connect failed");
                let resp = Response::bad_gateway("Upstream unreachable");
                wire::write_response(conn, &resp, &self.server_name, false)?;
                return Ok(502);
            }
            Err(e) => return Err(e),
        };

        // An upstream that does not speak parseable HTTP is recorded in
        // the 502 bucket on every path.
        let status = parse_status(&raw).unwrap_or(502);
        if cacheable && status == 200 && raw.len() <= self.max_body_bytes {
            self.cache.insert(key, raw.clone(), self.ttl);
            self.metrics.inc_cache_stores();
        }

        conn.write_all(&raw)?;
        conn.flush()?;
        Ok(status)
    }
}

/// Status code from a raw response: second token of the first line.
fn parse_status(raw: &[u8]) -> Option<u16> {
    let line_end = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
    let line = std::str::from_utf8(&raw[..line_end]).ok()?;
    line.split_whitespace().nth(1)?.parse().ok()
}
