mod forward;

use bytes::Bytes;
use clap::Parser;
use forward::ProxyService;
use gatehouse_cache::SharedLru;
use gatehouse_net::server::{Server, ServerSettings};
use gatehouse_net::{RateLimiter, ServerMetrics};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Gatehouse forward proxy — caching HTTP/1.1 proxy that routes by the
/// Host header.
#[derive(Parser)]
#[command(name = "proxy-server")]
struct Args {
    /// Listen port
    #[arg(default_value_t = 9090)]
    port: u16,

    /// Worker thread count
    #[arg(long, default_value_t = 100)]
    workers: usize,

    /// Pending-connection backlog
    #[arg(long, default_value_t = 1024)]
    backlog: usize,

    /// Response cache capacity (entries)
    #[arg(long, default_value_t = 1000)]
    cache_capacity: usize,

    /// Cached response TTL in seconds
    #[arg(long, default_value_t = 300)]
    ttl_seconds: u64,

    /// Largest cacheable response in bytes
    #[arg(long, default_value_t = 1_000_000)]
    max_body_bytes: usize,

    /// Sustained per-client requests per second
    #[arg(long, default_value_t = 50.0)]
    rate: f64,

    /// Per-client burst allowance
    #[arg(long, default_value_t = 100.0)]
    burst: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();

    let settings = ServerSettings {
        listen_addr: format!("0.0.0.0:{}", args.port),
        workers: args.workers,
        backlog: args.backlog,
        read_timeout: Duration::from_secs(10),
        grace: Duration::from_secs(5),
        server_name: "gatehouse-proxy/0.1".to_string(),
        date_header: false,
    };

    let metrics = Arc::new(ServerMetrics::new());
    let limiter = Arc::new(RateLimiter::new(args.rate, args.burst));
    let cache: Arc<SharedLru<Bytes>> = Arc::new(SharedLru::new(args.cache_capacity));

    let service = Arc::new(ProxyService::new(
        cache,
        Arc::clone(&metrics),
        Duration::from_secs(args.ttl_seconds),
        args.max_body_bytes,
        Duration::from_secs(5),
        Duration::from_secs(10),
        settings.server_name.clone(),
    ));

    let server = match Server::bind(settings, service, limiter, metrics) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, port = args.port, "failed to bind");
            std::process::exit(1);
        }
    };

    let handle = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        handle.stop();
    }) {
        tracing::warn!(error = %e, "could not install signal handler");
    }

    server.run();
}
