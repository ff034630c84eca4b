//! # HTTP Server
//!
//! Connection engine built on Hyper and Tokio.
//!
//! The engine only moves bytes: it buffers each request, hands it to the
//! [`Dispatcher`] and writes back whatever the dispatcher replies. Requests
//! are dispatched one at a time; the dispatcher lock is held only for the
//! synchronous dispatch call, never across an await point.
//!
//! ## Key Features
//!
//! - HTTP/1.1 with keep-alive and an idle (header read) timeout
//! - Body size limit (413) and extension-method rejection (501)
//! - Requests refused while buffering still reach the access log; extension
//!   methods do not, as the dispatcher has no method to record for them
//! - Graceful shutdown on SIGINT

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::request::IncomingRequest;
use crate::response::{reason_phrase, Response};
use crate::router::{Method, RouteTable};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde::Deserialize;
use std::convert::Infallible;
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Seconds an idle keep-alive connection may wait for the next request
    pub idle_timeout_secs: u64,
    /// Access log field list; `None` disables the access log
    pub log_format: Option<String>,
    /// Put failure messages into error response bodies
    pub expose_errors: bool,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 4567).into(),
            idle_timeout_secs: 10,
            log_format: None,
            expose_errors: true,
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Idle timeout as a `Duration`
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// HTTP server
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Mutex<Dispatcher>>,
}

impl Server {
    /// Create a server logging to stdout (when a log format is configured)
    #[must_use]
    pub fn new(config: ServerConfig, routes: RouteTable) -> Self {
        Self::with_log_sink(config, routes, Box::new(std::io::stdout()))
    }

    /// Create a server writing its access log to `sink`
    #[must_use]
    pub fn with_log_sink(
        config: ServerConfig,
        routes: RouteTable,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        let access_log = config
            .log_format
            .as_deref()
            .and_then(|format| crate::access_log::AccessLog::new(format, sink));
        let dispatcher = Dispatcher::new(routes)
            .with_access_log(access_log)
            .expose_errors(config.expose_errors);
        Self {
            config,
            dispatcher: Arc::new(Mutex::new(dispatcher)),
        }
    }

    /// Server configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared handle to the dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Mutex<Dispatcher>> {
        Arc::clone(&self.dispatcher)
    }

    /// Bind the configured address
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the socket cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.address;
        TcpListener::bind(addr)
            .await
            .map_err(|source| Error::BindError {
                address: addr.to_string(),
                source,
            })
    }

    /// Bind and serve until SIGINT
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the socket cannot be bound.
    pub async fn serve(self) -> Result<()> {
        let listener = self.bind().await?;
        self.run(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the listener has no local address.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        lock(&self.dispatcher).log_startup(addr);
        info!("Server listening on http://{}", addr);

        let idle_timeout = self.config.idle_timeout();
        let max_body_size = self.config.max_body_size;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let dispatcher = Arc::clone(&self.dispatcher);

                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            handle_request(req, Arc::clone(&dispatcher), remote_addr, max_body_size)
                        });
                        if let Err(err) = http1::Builder::new()
                            .timer(TokioTimer::new())
                            .header_read_timeout(idle_timeout)
                            .keep_alive(true)
                            .serve_connection(io, service)
                            .await
                        {
                            warn!("Error serving connection: {:?}", err);
                        }
                    });
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}

fn lock(dispatcher: &Mutex<Dispatcher>) -> std::sync::MutexGuard<'_, Dispatcher> {
    dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn handle_request(
    req: Request<Incoming>,
    dispatcher: Arc<Mutex<Dispatcher>>,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let uri = req.uri().to_string();
    let path = req.uri().path().to_string();
    let version = req.version();

    let response = match IncomingRequest::from_hyper(req, remote_addr, max_body_size).await {
        Ok(incoming) => {
            let (tx, rx) = oneshot::channel();
            lock(&dispatcher).dispatch(
                incoming,
                Box::new(move |response: Response| {
                    let _ = tx.send(response);
                }),
            );
            rx.await.unwrap_or_else(|_| {
                error!("dispatcher dropped the responder");
                Response::text(500, "Internal Server Error")
            })
        }
        Err(Error::UnsupportedMethod { method }) => {
            warn!("Rejected extension method {}", method);
            Response::text(501, "Not Implemented")
        }
        Err(e) => {
            let status = if matches!(e, Error::PayloadTooLarge { .. }) { 413 } else { 400 };
            warn!("Failed to read request: {}", e);
            match Method::from_hyper(&method) {
                Some(m) => {
                    let rejected = IncomingRequest::new(m, uri).remote_addr(remote_addr);
                    let response = lock(&dispatcher).reject(rejected, status, &e.to_string());
                    response
                }
                None => Response::text(status, reason_phrase(status)),
            }
        }
    };

    info!(
        "    {} - \"{} {} {:?}\" {}",
        remote_addr, method, path, version, response.status
    );
    Ok(response.into_hyper())
}
