//! # Handlers and Failure Mapping
//!
//! A handler is a synchronous callable receiving the request context and the
//! cast path parameters. It either returns a [`HandlerOutput`] or fails with
//! a [`HandlerError`]:
//!
//! - [`HandlerError::Http`] - a declared HTTP error with its own status
//!   (500 when none is given) and message
//! - [`HandlerError::Unhandled`] - any other failure, reported as 500 with the
//!   error type and the location where it was raised
//! - [`HandlerError::Panicked`] - the handler panicked
//!
//! Panics never escape [`invoke`], so one failing request cannot take the
//! dispatcher down with it.

use crate::request::RequestContext;
use crate::response::{valid_status, HandlerOutput};
use crate::types::PathParams;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;
use thiserror::Error;

/// Handler return type
pub type HandlerResult = Result<HandlerOutput, HandlerError>;

/// Handler function type
pub type Handler = Arc<dyn Fn(&mut RequestContext, &PathParams) -> HandlerResult + Send + Sync>;

/// Handler failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Declared HTTP error
    #[error("{message}")]
    Http {
        /// Explicit status, 500 when absent
        status: Option<u16>,
        /// Message reported to the client
        message: String,
    },

    /// Failure the handler did not translate into an HTTP error
    #[error("Uncaught exception '{type_name}' within request handler thrown in {file} on line {line} {message}")]
    Unhandled {
        /// Type of the underlying error
        type_name: String,
        /// Source file where the error was raised
        file: String,
        /// Source line where the error was raised
        line: u32,
        /// Error message
        message: String,
    },

    /// The handler panicked
    #[error("Uncaught panic within request handler: {message}")]
    Panicked {
        /// Panic payload, if it was a string
        message: String,
    },
}

impl HandlerError {
    /// Declared HTTP error with an explicit status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Declared HTTP error with the default status (500)
    pub fn message(message: impl Into<String>) -> Self {
        Self::Http {
            status: None,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error, recording the caller's location
    #[track_caller]
    pub fn unhandled<E: std::error::Error>(err: E) -> Self {
        let location = Location::caller();
        Self::Unhandled {
            type_name: short_type_name::<E>().to_string(),
            file: location.file().to_string(),
            line: location.line(),
            message: err.to_string(),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self::Panicked { message }
    }

    /// HTTP status for this failure
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Http { status, .. } => status.map_or(500, valid_status),
            Self::Unhandled { .. } | Self::Panicked { .. } => 500,
        }
    }
}

fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Conversions from foreign errors into handler failures
pub trait ResultExt<T> {
    /// Map the error to [`HandlerError::Unhandled`] at the caller's location
    ///
    /// # Errors
    ///
    /// Returns the wrapped error if `self` is `Err`.
    fn or_unhandled(self) -> Result<T, HandlerError>;

    /// Map the error to a declared HTTP error with the given status
    ///
    /// # Errors
    ///
    /// Returns the wrapped error if `self` is `Err`.
    fn or_http(self, status: u16) -> Result<T, HandlerError>;
}

impl<T, E: std::error::Error> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn or_unhandled(self) -> Result<T, HandlerError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(HandlerError::unhandled(e)),
        }
    }

    fn or_http(self, status: u16) -> Result<T, HandlerError> {
        self.map_err(|e| HandlerError::http(status, e.to_string()))
    }
}

/// Call a handler, converting a panic into [`HandlerError::Panicked`]
pub fn invoke(handler: &Handler, ctx: &mut RequestContext, params: &PathParams) -> HandlerResult {
    catch_unwind(AssertUnwindSafe(|| handler(ctx, params)))
        .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload.as_ref())))
}
