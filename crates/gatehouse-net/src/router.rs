use crate::wire::{Request, Response};
use ahash::RandomState;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A route handler: the seam where business logic plugs in. Registered
/// at startup, receives the parsed request, returns a response.
pub type Handler = Box<dyn Fn(&Request) -> Result<Response, BoxError> + Send + Sync>;

/// Exact-match method+path routing table. No wildcards, no path
/// parameters. Unmatched routes get a 404; a handler error or panic is
/// converted to a 500 at the dispatch boundary so a worker thread can
/// never be taken down by a handler.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Handler, RandomState>,
}

fn route_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &mut self,
        method: &str,
        path: &str,
        handler: impl Fn(&Request) -> Result<Response, BoxError> + Send + Sync + 'static,
    ) {
        self.routes
            .insert(route_key(method, path), Box::new(handler));
    }

    pub fn get(
        &mut self,
        path: &str,
        handler: impl Fn(&Request) -> Result<Response, BoxError> + Send + Sync + 'static,
    ) {
        self.route("GET", path, handler);
    }

    pub fn post(
        &mut self,
        path: &str,
        handler: impl Fn(&Request) -> Result<Response, BoxError> + Send + Sync + 'static,
    ) {
        self.route("POST", path, handler);
    }

    pub fn put(
        &mut self,
        path: &str,
        handler: impl Fn(&Request) -> Result<Response, BoxError> + Send + Sync + 'static,
    ) {
        self.route("PUT", path, handler);
    }

    pub fn delete(
        &mut self,
        path: &str,
        handler: impl Fn(&Request) -> Result<Response, BoxError> + Send + Sync + 'static,
    ) {
        self.route("DELETE", path, handler);
    }

    pub fn dispatch(&self, req: &Request) -> Response {
        let handler = match self.routes.get(&route_key(&req.method, &req.path)) {
            Some(h) => h,
            None => return Response::not_found(),
        };

        match catch_unwind(AssertUnwindSafe(|| handler(req))) {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::error!(
                    method = %req.method,
                    path = %req.path,
                    error = %e,
                    "handler failed"
                );
                Response::internal_error("Unhandled error")
            }
            Err(_) => {
                tracing::error!(
                    method = %req.method,
                    path = %req.path,
                    "handler panicked"
                );
                Response::internal_error("Unhandled error")
            }
        }
    }
}
