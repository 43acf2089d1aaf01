mod config;
mod routes;
mod service;

use clap::Parser;
use config::Config;
use gatehouse_cache::SharedLru;
use gatehouse_net::server::{Server, ServerSettings};
use gatehouse_net::{RateLimiter, ServerMetrics};
use service::OriginService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Gatehouse origin server — multithreaded HTTP/1.1 server with a
/// response cache and per-client rate limiting.
#[derive(Parser)]
#[command(name = "origin-server")]
struct Args {
    /// Listen port (overrides the config file)
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(long, default_value = "gatehouse.toml")]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        match Config::load(&args.config) {
            Ok(c) => {
                tracing::info!(path = %args.config.display(), "loaded config");
                c
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load config, using defaults");
                Config::default_config()
            }
        }
    } else {
        tracing::info!("no config file found, using defaults");
        Config::default_config()
    };

    let port = args.port.unwrap_or(config.server.port);
    let workers = if config.pool.workers > 0 {
        config.pool.workers
    } else {
        ServerSettings::default_workers()
    };

    let settings = ServerSettings {
        listen_addr: format!("0.0.0.0:{port}"),
        workers,
        backlog: config.pool.backlog,
        read_timeout: Duration::from_millis(config.server.read_timeout_ms),
        grace: Duration::from_millis(config.pool.grace_ms),
        server_name: "gatehouse-origin/0.1".to_string(),
        date_header: true,
    };

    let metrics = Arc::new(ServerMetrics::new());
    let limiter = Arc::new(RateLimiter::new(
        config.limit.rate_per_second,
        config.limit.burst,
    ));
    let cache = Arc::new(SharedLru::new(config.cache.capacity));

    let router = routes::build_router(Arc::clone(&metrics), Arc::clone(&cache));
    let service = Arc::new(OriginService::new(
        router,
        cache,
        Arc::clone(&metrics),
        Duration::from_secs(config.cache.ttl_seconds),
        config.cache.max_body_bytes,
        settings.server_name.clone(),
    ));

    let server = match Server::bind(settings, service, limiter, metrics) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, port, "failed to bind");
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
