//! # Dispatcher
//!
//! Runs one buffered request through the pipeline:
//!
//! ```text
//! Received -> PathResolved -> Parsed -> Casted -> Invoked -> ResponseBuilt -> Logged
//!                  \             \         \         \            \
//!                   +-------------+---------+---------+------------+--> Failed(status, message) -> Logged
//! ```
//!
//! Every request is logged exactly once, whichever way it ends. The response
//! is delivered through the request's [`Responder`] unless the handler already
//! replied on its own.
//!
//! The dispatcher owns the route table, the access log and the request
//! counter. It is driven by one caller at a time (`&mut self`).

use crate::access_log::{AccessLog, LogEntry};
use crate::body::parse_body;
use crate::cookie::parse_cookies;
use crate::error::RequestError;
use crate::handler::invoke;
use crate::request::{parse_query_string, IncomingRequest, RequestContext};
use crate::response::{build_response, Responder, Response};
use crate::router::{Method, Resolution, RouteTable};
use crate::types::apply_casts;
use hyper::header::{HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use std::net::SocketAddr;
use std::sync::mpsc;
use tracing::{debug, error, warn};

/// Request dispatcher
#[derive(Debug)]
pub struct Dispatcher {
    routes: RouteTable,
    access_log: Option<AccessLog>,
    request_counter: u64,
    expose_errors: bool,
}

impl Dispatcher {
    /// Create a dispatcher over a finished route table
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            access_log: None,
            request_counter: 0,
            expose_errors: true,
        }
    }

    /// Attach an access log
    #[must_use]
    pub fn with_access_log(mut self, log: Option<AccessLog>) -> Self {
        self.access_log = log;
        self
    }

    /// Whether failure messages go into response bodies
    ///
    /// When disabled clients only get the status reason phrase; the message
    /// still reaches the access log and tracing output.
    #[must_use]
    pub fn expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    /// Write the access log header block, if logging is enabled
    pub fn log_startup(&mut self, addr: SocketAddr) {
        if let Some(log) = &mut self.access_log {
            log.write_header(addr);
        }
    }

    /// Number of requests dispatched so far
    #[must_use]
    pub const fn request_count(&self) -> u64 {
        self.request_counter
    }

    /// Route table
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Dispatch one request
    ///
    /// The response goes out through `responder`; failures never escape this
    /// call.
    pub fn dispatch(&mut self, req: IncomingRequest, responder: Responder) {
        self.request_counter += 1;
        let mut ctx = RequestContext::new(self.request_counter, req, responder);

        if let Err(err) = self.process(&mut ctx) {
            self.fail(&mut ctx, &err);
        }

        self.finish(&ctx);
    }

    /// Dispatch one request and return the response directly
    pub fn handle(&mut self, req: IncomingRequest) -> Response {
        collect(|responder| self.dispatch(req, responder))
    }

    /// Answer a request the engine refused before it could be dispatched
    ///
    /// No route is resolved and no handler runs, but the request still gets a
    /// sequence number and an access log line.
    pub fn reject(&mut self, req: IncomingRequest, status: u16, message: &str) -> Response {
        self.request_counter += 1;
        let request_id = self.request_counter;
        collect(|responder| {
            let mut ctx = RequestContext::new(request_id, req, responder);
            ctx.set_error(message.to_string());
            ctx.respond(Response::error(status, message, self.expose_errors));
            self.finish(&ctx);
        })
    }

    fn process(&self, ctx: &mut RequestContext) -> Result<(), RequestError> {
        let path = request_path(ctx.uri())?;
        ctx.set_path(path);

        let (route_id, mut params) = match self.routes.resolve(ctx.method(), ctx.path()) {
            Resolution::Found { route, params } => (route, params),
            Resolution::NotFound => {
                return Err(RequestError::RouteNotFound {
                    path: ctx.path().to_string(),
                })
            }
            Resolution::MethodNotAllowed { allow } => {
                return Err(RequestError::MethodNotAllowed {
                    path: ctx.path().to_string(),
                    allow,
                })
            }
        };
        let route = self
            .routes
            .route(route_id)
            .ok_or_else(|| RequestError::RouteNotFound {
                path: ctx.path().to_string(),
            })?;

        apply_casts(&mut params, &route.casts)?;

        let cookie_header = ctx
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        ctx.cookies = parse_cookies(&cookie_header);
        ctx.query = parse_query_string(ctx.query_string());

        if ctx.method() == Method::Post {
            let content_length = ctx
                .header(CONTENT_LENGTH.as_str())
                .and_then(|v| v.trim().parse::<usize>().ok());
            let parsed = parse_body(
                ctx.header(CONTENT_TYPE.as_str()),
                content_length,
                ctx.body(),
            )?;
            ctx.form = parsed.fields;
            ctx.files = parsed.files;
        }

        let output = invoke(&route.handler, ctx, &params)?;
        if ctx.is_sent() {
            return Ok(());
        }

        let mut response = build_response(ctx.status(), output)?;
        response.merge_headers(ctx.take_response_headers());
        ctx.respond(response);
        Ok(())
    }

    fn fail(&self, ctx: &mut RequestContext, err: &RequestError) {
        let status = err.status();
        let message = err.to_string();
        if status >= 500 {
            error!(request_id = ctx.request_id(), status, error = %message, "request handler failed");
        }
        ctx.set_error(message);

        if ctx.is_sent() {
            return;
        }

        let mut response = Response::error(status, ctx.error().unwrap_or_default(), self.expose_errors);
        if let RequestError::MethodNotAllowed { allow, .. } = err {
            let methods = allow
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&methods) {
                response.headers.insert(ALLOW, value);
            }
        }
        ctx.respond(response);
    }

    fn finish(&mut self, ctx: &RequestContext) {
        let status = ctx.status();
        if status >= 400 {
            warn!(
                request_id = ctx.request_id(),
                method = %ctx.method(),
                path = ctx.path(),
                status,
                bytes = ctx.response_len(),
                error = ctx.error().unwrap_or_default(),
                "request failed"
            );
        } else {
            debug!(
                request_id = ctx.request_id(),
                method = %ctx.method(),
                path = ctx.path(),
                status,
                bytes = ctx.response_len(),
                "request served"
            );
        }

        if let Some(log) = &mut self.access_log {
            log.log(&LogEntry::new(ctx));
        }
    }
}

fn collect(run: impl FnOnce(Responder)) -> Response {
    let (tx, rx) = mpsc::channel();
    run(Box::new(move |response: Response| {
        let _ = tx.send(response);
    }));
    rx.try_recv().unwrap_or_else(|_| {
        error!("dispatch finished without a response");
        Response::new(500)
    })
}

fn request_path(uri: &str) -> Result<String, RequestError> {
    let parsed: hyper::Uri = uri.parse().map_err(|_| RequestError::MalformedUri)?;
    let path = parsed.path();
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Err(RequestError::MalformedUri)
    }
}
