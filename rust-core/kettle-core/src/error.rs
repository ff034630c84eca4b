//! # Error Handling
//!
//! Centralized error types for Kettle core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Two families live here:
//!
//! - [`Error`] - infrastructure failures (binding, route registration, IO).
//!   These surface to whoever builds or runs the server.
//! - [`RequestError`] - failures of a single request. Every variant maps to an
//!   HTTP status and never outlives the dispatch that produced it.

use crate::handler::HandlerError;
use crate::response::ValueKind;
use crate::router::Method;
use thiserror::Error;

/// Result type alias for Kettle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Kettle runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error from the SIMD parser
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] simd_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request method outside the supported set
    #[error("Unsupported method: {method}")]
    UnsupportedMethod {
        /// The method as received
        method: String,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

/// Failure of a single request, resolved into a status and message
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request URI did not yield a usable path
    #[error("Cannot determine path of the uri")]
    MalformedUri,

    /// No route matches the path under any method
    #[error("Cannot determine route for the path '{path}'")]
    RouteNotFound {
        /// The requested path
        path: String,
    },

    /// The path is routed, but not for this method
    #[error("Cannot determine route for the path '{path}'")]
    MethodNotAllowed {
        /// The requested path
        path: String,
        /// Methods that would have matched
        allow: Vec<Method>,
    },

    /// A path parameter failed its safety check
    #[error("Detected invalid characters in the URI.")]
    InvalidPathParameter {
        /// Name of the offending parameter
        name: String,
    },

    /// More body bytes arrived than `Content-Length` announced
    #[error("Actual POST length {actual} does not match Content-Length {declared}")]
    BodyLengthMismatch {
        /// Bytes received
        actual: usize,
        /// Declared length (0 when the header is missing)
        declared: usize,
    },

    /// The handler failed
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The handler returned a value that cannot become a response body
    #[error("Request handler must return a string instead of {0}")]
    UnsupportedReturnType(ValueKind),
}

impl RequestError {
    /// HTTP status code for this failure
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedUri
            | Self::InvalidPathParameter { .. }
            | Self::BodyLengthMismatch { .. } => 400,
            Self::RouteNotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Handler(err) => err.status(),
            Self::UnsupportedReturnType(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:4567".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:4567"));
    }

    #[test]
    fn test_route_errors_share_message() {
        let not_found = RequestError::RouteNotFound {
            path: "/nope".to_string(),
        };
        let not_allowed = RequestError::MethodNotAllowed {
            path: "/nope".to_string(),
            allow: vec![Method::Get],
        };
        assert_eq!(not_found.status(), 404);
        assert_eq!(not_allowed.status(), 405);
        assert_eq!(
            not_found.to_string(),
            "Cannot determine route for the path '/nope'"
        );
        assert_eq!(not_found.to_string(), not_allowed.to_string());
    }

    #[test]
    fn test_body_length_mismatch_message() {
        let err = RequestError::BodyLengthMismatch {
            actual: 12,
            declared: 7,
        };
        assert_eq!(err.status(), 400);
        assert_eq!(
            err.to_string(),
            "Actual POST length 12 does not match Content-Length 7"
        );
    }

    #[test]
    fn test_unsupported_return_type_names_kind() {
        let err = RequestError::UnsupportedReturnType(ValueKind::Integer);
        assert_eq!(err.status(), 500);
        assert!(err.to_string().ends_with("instead of integer"));
    }
}
