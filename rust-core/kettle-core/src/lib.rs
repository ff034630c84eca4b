//! # Kettle Core
//!
//! An embeddable HTTP/1.1 application server with method and path routing.
//!
//! ## Architecture
//!
//! The connection engine (`server`) only moves bytes. Every buffered request
//! goes through the [`Dispatcher`], which resolves a route, decodes the
//! request inputs, runs the handler and replies exactly once.
//!
//! ## Modules
//!
//! - `server` - HTTP server built on Hyper
//! - `dispatcher` - Per-request pipeline and failure mapping
//! - `router` - Route table and method/path resolution
//! - `route` - Route definitions and path template compilation
//! - `request` - Incoming request and per-request handler context
//! - `response` - Responses and handler return values
//! - `handler` - Handler signature and handler failures
//! - `body` - Form and multipart body decoding
//! - `cookie` - Cookie header decoding
//! - `access_log` - W3C extended access log
//! - `json` - JSON parsing with simd-json
//! - `types` - Path parameter casts and values
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access_log;
pub mod body;
pub mod cookie;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod json;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod types;

pub use access_log::AccessLog;
pub use body::UploadedFile;
pub use dispatcher::Dispatcher;
pub use error::{Error, RequestError, Result};
pub use handler::{Handler, HandlerError, HandlerResult, ResultExt};
pub use json::{parse_json, to_json};
pub use request::{IncomingRequest, RequestContext};
pub use response::{HandlerOutput, JsonSerializable, Response, ValueKind};
pub use route::RouteSpec;
pub use router::{Method, Resolution, RouteTable};
pub use server::{Server, ServerConfig};
pub use types::{ParamCast, ParamValue, PathParams};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.1");
    }
}
