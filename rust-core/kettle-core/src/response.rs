//! # Response Construction
//!
//! Turns what a handler returned into an HTTP response.
//!
//! Handlers return a [`HandlerOutput`], a closed set of shapes:
//!
//! | output          | 2xx status                               |
//! |-----------------|------------------------------------------|
//! | `Text`          | body verbatim                            |
//! | `Empty`         | empty body                               |
//! | `Json`          | serialized body, `application/json`      |
//! | `Unsupported`   | 500 naming the offending kind            |
//!
//! When the handler set a non-2xx status the return value is ignored and the
//! response body is empty.

use crate::error::RequestError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;
use std::fmt;

/// One-shot sink that delivers a response to the client
pub type Responder = Box<dyn FnOnce(Response) + Send>;

/// Outbound HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Empty response with the given status
    ///
    /// Codes outside 100..=599 become 500.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status: valid_status(status),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Plain-text response
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_body(body.into())
            .with_header(CONTENT_TYPE, "text/plain; charset=utf-8")
    }

    /// JSON response from an already-serialized body
    #[must_use]
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_body(body.into())
            .with_header(CONTENT_TYPE, "application/json")
    }

    /// Error response
    ///
    /// With `expose` the message becomes the body; otherwise clients only see
    /// the status reason phrase.
    #[must_use]
    pub fn error(status: u16, message: &str, expose: bool) -> Self {
        if expose {
            Self::text(status, message)
        } else {
            Self::text(status, reason_phrase(status))
        }
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header
    #[must_use]
    pub fn with_header(mut self, name: hyper::header::HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Copy headers over this response's, replacing same-named ones
    pub fn merge_headers(&mut self, headers: HeaderMap) {
        let mut last = None;
        for (name, value) in headers {
            if let Some(name) = name {
                self.headers.remove(&name);
                last = Some(name);
            }
            if let Some(name) = &last {
                self.headers.append(name.clone(), value);
            }
        }
    }

    /// Convert to a hyper response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        *response.headers_mut() = self.headers;
        response
    }
}

/// The status itself if it is a valid HTTP code, otherwise 500
#[must_use]
pub const fn valid_status(status: u16) -> u16 {
    if matches!(status, 100..=599) {
        status
    } else {
        500
    }
}

/// Canonical reason phrase, or `"Unknown"`
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Kind of a handler return value that cannot become a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// List of values
    Array,
    /// Map or structured value without a JSON form
    Object,
    /// Integer number
    Integer,
    /// Floating-point number
    Double,
    /// Boolean
    Boolean,
    /// Handle to an external resource
    Resource,
    /// Anything else
    Unknown,
}

impl ValueKind {
    /// Lower-case name used in error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Object => "object",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Resource => "resource",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value that knows its own JSON form
///
/// Implemented for every `serde::Serialize` type.
pub trait JsonSerializable {
    /// Serialize to JSON; `None` if the value has no JSON form
    fn json_serialize(&self) -> Option<String>;
}

impl<T: Serialize> JsonSerializable for T {
    fn json_serialize(&self) -> Option<String> {
        match crate::json::to_json(self) {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!(error = %e, "handler value failed to serialize");
                None
            }
        }
    }
}

/// What a handler returned
pub enum HandlerOutput {
    /// Body text
    Text(String),
    /// No body
    Empty,
    /// A value serialized to JSON
    Json(Box<dyn JsonSerializable>),
    /// A value that cannot become a body
    Unsupported(ValueKind),
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Empty => f.write_str("Empty"),
            Self::Json(_) => f.write_str("Json(..)"),
            Self::Unsupported(kind) => f.debug_tuple("Unsupported").field(kind).finish(),
        }
    }
}

impl HandlerOutput {
    /// Wrap any serializable value
    pub fn json<T: Serialize + 'static>(value: T) -> Self {
        Self::Json(Box::new(value))
    }
}

impl From<String> for HandlerOutput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for HandlerOutput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<()> for HandlerOutput {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Self>> From<Option<T>> for HandlerOutput {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

macro_rules! unsupported_from {
    ($kind:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for HandlerOutput {
                fn from(_: $ty) -> Self {
                    Self::Unsupported(ValueKind::$kind)
                }
            }
        )+
    };
}

unsupported_from!(Integer: i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
unsupported_from!(Double: f32, f64);
unsupported_from!(Boolean: bool);

impl<T> From<Vec<T>> for HandlerOutput {
    fn from(_: Vec<T>) -> Self {
        Self::Unsupported(ValueKind::Array)
    }
}

impl From<serde_json::Value> for HandlerOutput {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Empty,
            Value::String(s) => Self::Text(s),
            Value::Bool(_) => Self::Unsupported(ValueKind::Boolean),
            Value::Number(n) if n.is_f64() => Self::Unsupported(ValueKind::Double),
            Value::Number(_) => Self::Unsupported(ValueKind::Integer),
            Value::Array(_) => Self::Unsupported(ValueKind::Array),
            Value::Object(_) => Self::Unsupported(ValueKind::Object),
        }
    }
}

/// Build the automatic response for a successful handler call
///
/// # Arguments
///
/// * `status` - Status set by the handler, 0 if none
/// * `output` - Handler return value
///
/// # Errors
///
/// Returns `RequestError::UnsupportedReturnType` for a 2xx status whose
/// output cannot become a body.
pub fn build_response(status: u16, output: HandlerOutput) -> Result<Response, RequestError> {
    let status = if status == 0 { 200 } else { status };
    if !(200..300).contains(&status) {
        return Ok(Response::new(status));
    }

    match output {
        HandlerOutput::Text(body) => Ok(Response::text(status, body)),
        HandlerOutput::Empty => Ok(Response::new(status)),
        HandlerOutput::Json(value) => match value.json_serialize() {
            Some(body) if !body.is_empty() => Ok(Response::json(status, body)),
            _ => Err(RequestError::UnsupportedReturnType(ValueKind::Object)),
        },
        HandlerOutput::Unsupported(kind) => Err(RequestError::UnsupportedReturnType(kind)),
    }
}
