//! Blocking HTTP/1.1 service core shared by the origin server and the
//! forward proxy: a hand-rolled wire codec, a bounded OS-thread worker
//! pool, a token-bucket rate limiter, lock-free metrics, and a
//! connection supervisor that ties them together.
//!
//! Connections are single-request: parse, gate, serve, respond, close.
//! There is no keep-alive, no TLS and no HTTP/2.

pub mod error;
pub mod headers;
pub mod limiter;
pub mod metrics;
pub mod pool;
pub mod router;
pub mod server;
pub mod wire;

pub use error::{ServeError, WireError};
pub use headers::Headers;
pub use limiter::RateLimiter;
pub use metrics::ServerMetrics;
pub use router::Router;
pub use server::{RequestHandler, Server, ServerSettings, ShutdownHandle};
pub use wire::{Request, Response};
