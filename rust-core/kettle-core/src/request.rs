//! # HTTP Request
//!
//! Inbound request data and the per-request context handed to handlers.
//!
//! An [`IncomingRequest`] is what the connection engine produces: method,
//! raw URI, headers, a fully-buffered body and the peer address. The
//! dispatcher turns it into a [`RequestContext`], which additionally carries
//! the decoded cookies, query and form data, plus the response state the
//! handler can influence (status, headers, early reply).

use crate::body::UploadedFile;
use crate::error::{Error, Result};
use crate::response::{Responder, Response};
use crate::router::Method;
use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Request};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A fully-buffered inbound request
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// HTTP method
    pub method: Method,
    /// Raw request target (path plus optional query)
    pub uri: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// Peer address, if known
    pub remote_addr: Option<SocketAddr>,
}

impl IncomingRequest {
    /// Create a request with no headers and an empty body
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    /// Add a header; invalid names or values are ignored
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(n, v);
        }
        self
    }

    /// Set the body
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the peer address
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl IncomingRequest {
    /// Buffer a hyper request
    ///
    /// # Errors
    ///
    /// - `Error::UnsupportedMethod` for extension methods
    /// - `Error::PayloadTooLarge` when the declared or actual body exceeds
    ///   `max_body_size`
    /// - `Error::Http` if reading the body fails
    pub async fn from_hyper(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from_hyper(req.method()).ok_or_else(|| Error::UnsupportedMethod {
            method: req.method().to_string(),
        })?;
        let uri = req.uri().to_string();
        let headers = req.headers().clone();

        if let Some(declared) = headers
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if declared > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: declared,
                });
            }
        }

        let body = BodyExt::collect(req.into_body()).await?.to_bytes();
        if body.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: body.len(),
            });
        }

        Ok(Self {
            method,
            uri,
            headers,
            body,
            remote_addr: Some(remote_addr),
        })
    }
}

/// Per-request state shared between the dispatcher and the handler
pub struct RequestContext {
    request_id: u64,
    method: Method,
    uri: String,
    path: String,
    query_string: Option<String>,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Bytes,
    pub(crate) cookies: HashMap<String, String>,
    pub(crate) query: HashMap<String, String>,
    pub(crate) form: HashMap<String, String>,
    pub(crate) files: Vec<UploadedFile>,
    status: u16,
    response_headers: HeaderMap,
    pub(crate) response_len: usize,
    error: Option<String>,
    sent: bool,
    responder: Option<Responder>,
    started: Instant,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("status", &self.status)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub(crate) fn new(request_id: u64, req: IncomingRequest, responder: Responder) -> Self {
        let (path, query_string) = match req.uri.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (req.uri.clone(), None),
        };
        Self {
            request_id,
            method: req.method,
            uri: req.uri,
            path,
            query_string,
            headers: req.headers,
            remote_addr: req.remote_addr,
            body: req.body,
            cookies: HashMap::new(),
            query: HashMap::new(),
            form: HashMap::new(),
            files: Vec::new(),
            status: 0,
            response_headers: HeaderMap::new(),
            response_len: 0,
            error: None,
            sent: false,
            responder: Some(responder),
            started: Instant::now(),
        }
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    /// Sequence number of this request within the dispatcher
    #[must_use]
    pub const fn request_id(&self) -> u64 {
        self.request_id
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Raw request target as received
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Request path (without query string)
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All request headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Peer address
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Raw body bytes
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, if valid
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::JsonParse` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        crate::json::parse_json_bytes(&mut self.body.to_vec())
    }

    /// Get a cookie by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// All cookies
    #[must_use]
    pub const fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Get a query parameter by name
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// All query parameters
    #[must_use]
    pub const fn query_map(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Get a form field by name
    #[must_use]
    pub fn form(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// All form fields
    #[must_use]
    pub const fn form_map(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// Uploaded files
    #[must_use]
    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// First uploaded file for a form field
    #[must_use]
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Response status; 0 while unset
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Set the response status
    ///
    /// A non-2xx status makes the dispatcher ignore the handler's return value.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Set or override a response header; invalid names or values are ignored
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.response_headers.insert(n, v);
        }
    }

    /// Response headers set so far
    #[must_use]
    pub const fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub(crate) fn take_response_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.response_headers)
    }

    /// Error message recorded for this request
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    /// Reply immediately
    ///
    /// Once a handler has replied, the dispatcher skips automatic response
    /// emission and only logs. Returns `false` if a reply was already sent.
    pub fn respond(&mut self, response: Response) -> bool {
        let Some(responder) = self.responder.take() else {
            tracing::warn!(request_id = self.request_id, "response already sent, dropping reply");
            return false;
        };
        self.status = response.status;
        self.response_len = response.body.len();
        self.sent = true;
        responder(response);
        true
    }

    /// True once a response went out
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent
    }

    /// Bytes in the response body
    #[must_use]
    pub const fn response_len(&self) -> usize {
        self.response_len
    }

    /// Time since the request entered the dispatcher
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Parse a query string into a map
///
/// Handles URL decoding and duplicate keys (last value wins).
pub(crate) fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| crate::body::parse_urlencoded(q.as_bytes()))
        .unwrap_or_default()
}

/// Percent-decode a URL component (`+` becomes a space)
///
/// Invalid escapes are kept verbatim; invalid UTF-8 is replaced.
pub(crate) fn url_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// Remove NUL bytes
pub(crate) fn scrub_nul(s: &str) -> String {
    if s.contains('\0') {
        s.replace('\0', "")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(req: IncomingRequest) -> RequestContext {
        RequestContext::new(1, req, Box::new(|_: Response| {}))
    }

    #[test]
    fn test_parse_query_string_simple() {
        let result = parse_query_string(Some("page=1&limit=10"));
        assert_eq!(result.get("page"), Some(&"1".to_string()));
        assert_eq!(result.get("limit"), Some(&"10".to_string()));
    }

    #[test]
    fn test_parse_query_string_empty() {
        assert!(parse_query_string(None).is_empty());
        assert!(parse_query_string(Some("")).is_empty());
    }

    #[test]
    fn test_parse_query_string_url_encoded() {
        let result = parse_query_string(Some("name=John+Doe&city=New%20York"));
        assert_eq!(result.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(result.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode("100%25"), "100%");
        assert_eq!(url_decode("50%"), "50%");
    }

    #[test]
    fn test_context_splits_query() {
        let ctx = context(IncomingRequest::new(Method::Get, "/search?q=rust"));
        assert_eq!(ctx.path(), "/search");
        assert_eq!(ctx.query_string(), Some("q=rust"));
        assert_eq!(ctx.status(), 0);
    }

    #[test]
    fn test_context_headers_case_insensitive() {
        let ctx = context(IncomingRequest::new(Method::Get, "/").header("X-Trace", "abc"));
        assert_eq!(ctx.header("x-trace"), Some("abc"));
    }

    #[test]
    fn test_context_json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            name: String,
        }
        let ctx = context(IncomingRequest::new(Method::Post, "/").body(r#"{"name":"kettle"}"#));
        let payload: Payload = ctx.json().unwrap();
        assert_eq!(payload.name, "kettle");
        assert!(ctx.json::<Payload>().is_ok());
    }

    #[test]
    fn test_respond_only_once() {
        let mut ctx = context(IncomingRequest::new(Method::Get, "/"));
        assert!(ctx.respond(Response::text(201, "created")));
        assert!(ctx.is_sent());
        assert_eq!(ctx.status(), 201);
        assert_eq!(ctx.response_len(), 7);
        assert!(!ctx.respond(Response::text(200, "again")));
    }

    #[test]
    fn test_set_header_ignores_invalid() {
        let mut ctx = context(IncomingRequest::new(Method::Get, "/"));
        ctx.set_header("X-Ok", "yes");
        ctx.set_header("Bad Header", "x");
        assert_eq!(ctx.response_headers().len(), 1);
    }
}
