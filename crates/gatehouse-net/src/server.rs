use crate::error::{ServeError, WireError};
use crate::limiter::RateLimiter;
use crate::metrics::ServerMetrics;
use crate::pool::WorkerPool;
use crate::wire::{self, Request, Response};
use parking_lot::{Condvar, Mutex};
use std::io::BufReader;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tuning for one server instance, injected at construction.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub workers: usize,
    pub backlog: usize,
    pub read_timeout: Duration,
    pub grace: Duration,
    /// Value of the `Server:` response header.
    pub server_name: String,
    /// Whether serialized responses carry a `Date:` header.
    pub date_header: bool,
}

impl ServerSettings {
    /// Worker count used when none is configured: 2×cores, at least 4.
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(4)
            .max(4)
    }
}

/// Strategy serving one parsed request on one connection. The origin
/// server dispatches to a routing table; the proxy forwards upstream.
/// Implementations write the response themselves and return the status
/// code for the metrics histogram.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, req: Request, conn: &mut TcpStream) -> Result<u16, ServeError>;
}

struct StopSignal {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Connection supervisor: owns the listening socket and the accept
/// loop, hands accepted connections to the bounded worker pool, and
/// governs the Stopped → Running → Stopped lifecycle.
///
/// A per-connection failure is caught inside the worker and never
/// reaches the accept loop.
pub struct Server<H: RequestHandler> {
    listener: TcpListener,
    settings: ServerSettings,
    handler: Arc<H>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<ServerMetrics>,
    running: Arc<AtomicBool>,
    stopped: Arc<StopSignal>,
}

impl<H: RequestHandler> Server<H> {
    /// Bind the listening socket. The server is not accepting until
    /// [`run`](Self::run) is called.
    pub fn bind(
        settings: ServerSettings,
        handler: Arc<H>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<ServerMetrics>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&settings.listen_addr)?;
        Ok(Self {
            listener,
            settings,
            handler,
            limiter,
            metrics,
            running: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(StopSignal {
                done: Mutex::new(false),
                cv: Condvar::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener
            .local_addr()
            .expect("listener has a local address")
    }

    /// Handle for stopping the server from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            port: self.local_addr().port(),
            stopped: Arc::clone(&self.stopped),
        }
    }

    /// Run the blocking accept loop on the calling thread until
    /// [`ShutdownHandle::stop`] is called. Worker connections get a
    /// bounded grace period on the way out.
    pub fn run(self) {
        let mut pool = WorkerPool::new(self.settings.workers, self.settings.backlog);

        tracing::info!(
            addr = %self.local_addr(),
            workers = self.settings.workers,
            backlog = self.settings.backlog,
            "server listening"
        );

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break; // woken by stop(); drop the wake connection
                    }
                    let handler = Arc::clone(&self.handler);
                    let limiter = Arc::clone(&self.limiter);
                    let metrics = Arc::clone(&self.metrics);
                    let settings = self.settings.clone();
                    let submitted = pool.try_execute(move || {
                        handle_connection(stream, peer, &settings, &*handler, &limiter, &metrics);
                    });
                    if submitted.is_err() {
                        // Saturated: close immediately, count the drop
                        self.metrics.inc_dropped();
                    }
                }
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }

        // Close the listening socket before draining workers, so no new
        // connection can be accepted during the grace period
        drop(self.listener);
        pool.shutdown(self.settings.grace);

        let mut done = self.stopped.done.lock();
        *done = true;
        self.stopped.cv.notify_all();
        tracing::info!("server stopped");
    }
}

/// Stops a running [`Server`]: clears the running flag, wakes the
/// blocked accept with a throwaway loopback connection, and waits until
/// the accept loop has exited and the listener is closed.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    port: u16,
    stopped: Arc<StopSignal>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return; // already stopped
        }
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port));

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut done = self.stopped.done.lock();
        while !*done {
            if self.stopped.cv.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
    }
}

/// One connection, one pass: timeout → parse → gate → serve → close.
/// The socket closes on drop on every path; close failures are not
/// re-raised.
fn handle_connection<H: RequestHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    settings: &ServerSettings,
    handler: &H,
    limiter: &RateLimiter,
    metrics: &ServerMetrics,
) {
    metrics.inc_connections();
    let start = Instant::now();
    let _ = stream.set_nodelay(true);
    if stream
        .set_read_timeout(Some(settings.read_timeout))
        .is_err()
    {
        metrics.inc_errors();
        return;
    }

    match serve_one(&mut stream, peer, settings, handler, limiter, metrics) {
        Ok(Some(status)) => metrics.observe_request(status, start.elapsed()),
        Ok(None) => {} // peer closed before sending a request
        Err(e) if e.is_timeout() => {
            metrics.inc_timeouts();
            tracing::debug!(%peer, "connection timed out");
        }
        Err(e) => {
            metrics.inc_errors();
            tracing::debug!(%peer, error = %e, "connection failed");
        }
    }
}

fn serve_one<H: RequestHandler>(
    stream: &mut TcpStream,
    peer: SocketAddr,
    settings: &ServerSettings,
    handler: &H,
    limiter: &RateLimiter,
    metrics: &ServerMetrics,
) -> Result<Option<u16>, ServeError> {
    let req = {
        let mut reader = BufReader::new(stream.try_clone()?);
        match wire::read_request(&mut reader) {
            Ok(req) => req,
            Err(WireError::ConnectionClosed) => return Ok(None),
            Err(WireError::Malformed) | Err(WireError::HeadersTooLarge) => {
                metrics.inc_bad_requests();
                wire::write_response(
                    stream,
                    &Response::bad_request("Malformed request"),
                    &settings.server_name,
                    settings.date_header,
                )?;
                return Ok(Some(400));
            }
            Err(WireError::Io(e)) => return Err(e.into()),
        }
    };

    let client = RateLimiter::client_key(&req, peer);
    if !limiter.allow(&client) {
        metrics.inc_rate_limited();
        wire::write_response(
            stream,
            &Response::too_many_requests("Rate limit exceeded"),
            &settings.server_name,
            settings.date_header,
        )?;
        return Ok(Some(429));
    }

    let status = handler.handle(req, stream)?;
    Ok(Some(status))
}
