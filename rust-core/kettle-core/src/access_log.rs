//! # Access Log
//!
//! W3C Extended Log File Format writer.
//!
//! The format is a whitespace-separated list of field names, e.g.
//! `date time c-ip cs-method cs-uri sc-status sc-bytes time-taken`.
//! A header block describing the fields is written once at startup, then one
//! line per request.
//!
//! Supported fields:
//!
//! | field            | value                                      |
//! |------------------|--------------------------------------------|
//! | `date`           | UTC date, `YYYY-MM-DD`                     |
//! | `time`           | UTC time, `HH:MM:SS`                       |
//! | `datetime`       | `YYYY-MM-DDTHH:MM:SSZ`                     |
//! | `c-ip`           | client address                             |
//! | `cs-method`      | request method                             |
//! | `cs-uri`         | request target as received                 |
//! | `cs-uri-stem`    | path                                       |
//! | `cs-uri-query`   | query string                               |
//! | `sc-status`      | response status                            |
//! | `sc-bytes`       | response body length                       |
//! | `time-taken`     | seconds, microsecond precision             |
//! | `x-request-id`   | dispatcher sequence number                 |
//! | `x-error`        | error message recorded for the request     |
//! | `x-memusage`     | resident memory of the process, bytes      |
//! | `cs(Name)`       | request header `Name`                      |
//!
//! Unknown fields and missing values are written as `-`.

use crate::request::RequestContext;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

/// A single log field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogField {
    /// `date`
    Date,
    /// `time`
    Time,
    /// `datetime`
    DateTime,
    /// `c-ip`
    ClientIp,
    /// `cs-method`
    Method,
    /// `cs-uri`
    Uri,
    /// `cs-uri-stem`
    UriStem,
    /// `cs-uri-query`
    UriQuery,
    /// `sc-status`
    Status,
    /// `sc-bytes`
    Bytes,
    /// `time-taken`
    TimeTaken,
    /// `x-request-id`
    RequestId,
    /// `x-error`
    Error,
    /// `x-memusage`
    MemUsage,
    /// `cs(Header-Name)`
    RequestHeader(String),
    /// Anything else
    Unknown(String),
}

impl LogField {
    /// Parse one field name
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            "c-ip" => Self::ClientIp,
            "cs-method" => Self::Method,
            "cs-uri" => Self::Uri,
            "cs-uri-stem" => Self::UriStem,
            "cs-uri-query" => Self::UriQuery,
            "sc-status" => Self::Status,
            "sc-bytes" => Self::Bytes,
            "time-taken" => Self::TimeTaken,
            "x-request-id" => Self::RequestId,
            "x-error" => Self::Error,
            "x-memusage" => Self::MemUsage,
            _ => name
                .strip_prefix("cs(")
                .and_then(|rest| rest.strip_suffix(')'))
                .filter(|header| !header.is_empty())
                .map_or_else(
                    || Self::Unknown(name.to_string()),
                    |header| Self::RequestHeader(header.to_ascii_lowercase()),
                ),
        }
    }
}

/// Everything a log line needs, borrowed from a finished request
#[derive(Debug)]
pub struct LogEntry<'a> {
    /// The finished request
    pub ctx: &'a RequestContext,
    /// When the line is written
    pub timestamp: DateTime<Utc>,
    /// Time spent in the dispatcher
    pub elapsed: Duration,
}

impl<'a> LogEntry<'a> {
    /// Capture an entry for a finished request, stamped now
    #[must_use]
    pub fn new(ctx: &'a RequestContext) -> Self {
        Self {
            ctx,
            timestamp: Utc::now(),
            elapsed: ctx.elapsed(),
        }
    }

    fn value(&self, field: &LogField) -> Option<String> {
        let ctx = self.ctx;
        match field {
            LogField::Date => Some(self.timestamp.format("%Y-%m-%d").to_string()),
            LogField::Time => Some(self.timestamp.format("%H:%M:%S").to_string()),
            LogField::DateTime => Some(self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            LogField::ClientIp => ctx.remote_addr().map(|a| a.ip().to_string()),
            LogField::Method => Some(ctx.method().to_string()),
            LogField::Uri => Some(ctx.uri().to_string()),
            LogField::UriStem => Some(ctx.path().to_string()),
            LogField::UriQuery => ctx.query_string().map(str::to_string),
            LogField::Status => Some(ctx.status().to_string()),
            LogField::Bytes => Some(ctx.response_len().to_string()),
            LogField::TimeTaken => Some(format!("{:.6}", self.elapsed.as_secs_f64())),
            LogField::RequestId => Some(ctx.request_id().to_string()),
            LogField::Error => ctx.error().map(str::to_string),
            LogField::MemUsage => resident_memory().map(|b| b.to_string()),
            LogField::RequestHeader(name) => ctx.header(name).map(str::to_string),
            LogField::Unknown(_) => None,
        }
    }
}

/// Access log writer
pub struct AccessLog {
    format: String,
    fields: Vec<LogField>,
    sink: Box<dyn Write + Send>,
}

impl std::fmt::Debug for AccessLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLog")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl AccessLog {
    /// Create a log writer
    ///
    /// Returns `None` for a blank format: no format means no log output.
    #[must_use]
    pub fn new(format: &str, sink: Box<dyn Write + Send>) -> Option<Self> {
        let format = format.split_whitespace().collect::<Vec<_>>().join(" ");
        if format.is_empty() {
            return None;
        }
        let fields = format.split(' ').map(LogField::parse).collect();
        Some(Self {
            format,
            fields,
            sink,
        })
    }

    /// Parsed fields, in output order
    #[must_use]
    pub fn fields(&self) -> &[LogField] {
        &self.fields
    }

    /// Write the startup header block
    pub fn write_header(&mut self, addr: SocketAddr) {
        let header = format!(
            "#Version: 1.0\n#Date: {}\n#Software: kettle, version {}\n\
             #Remark: Server bound to {} on port {}\n\
             #Remark: W3C Extended Log File Format\n#Fields: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            crate::VERSION,
            addr.ip(),
            addr.port(),
            self.format,
        );
        self.write(header.as_bytes());
    }

    /// Render one line, without the trailing newline
    #[must_use]
    pub fn format_line(&self, entry: &LogEntry<'_>) -> String {
        self.fields
            .iter()
            .map(|field| entry.value(field).map_or_else(|| "-".to_string(), quote))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Write one line for a finished request
    pub fn log(&mut self, entry: &LogEntry<'_>) {
        let mut line = self.format_line(entry);
        line.push('\n');
        self.write(line.as_bytes());
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.sink.write_all(bytes).and_then(|()| self.sink.flush()) {
            tracing::error!(error = %e, "failed to write access log");
        }
    }
}

fn quote(value: String) -> String {
    if value.is_empty() {
        "-".to_string()
    } else if value.contains(|c: char| c.is_whitespace() || c == '"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

fn resident_memory() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

/// In-memory sink for inspecting log output in tests
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct MemorySink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl MemorySink {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::IncomingRequest;
    use crate::response::Response;
    use crate::router::Method;
    use chrono::TimeZone;

    fn finished(req: IncomingRequest, status: u16, body: &str) -> RequestContext {
        let mut ctx = RequestContext::new(7, req, Box::new(|_: Response| {}));
        ctx.respond(Response::text(status, body));
        ctx
    }

    fn entry(ctx: &RequestContext) -> LogEntry<'_> {
        LogEntry {
            ctx,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            elapsed: Duration::from_micros(1500),
        }
    }

    #[test]
    fn test_blank_format_disables_log() {
        assert!(AccessLog::new("", Box::new(MemorySink::default())).is_none());
        assert!(AccessLog::new("  \t", Box::new(MemorySink::default())).is_none());
    }

    #[test]
    fn test_parse_fields() {
        let log = AccessLog::new("date  cs(User-Agent) bogus", Box::new(std::io::sink())).unwrap();
        assert_eq!(
            log.fields(),
            &[
                LogField::Date,
                LogField::RequestHeader("user-agent".to_string()),
                LogField::Unknown("bogus".to_string()),
            ]
        );
    }

    #[test]
    fn test_format_line() {
        let req = IncomingRequest::new(Method::Get, "/users/42?x=1")
            .remote_addr("10.0.0.5:5555".parse().unwrap());
        let ctx = finished(req, 200, "user 42");
        let log = AccessLog::new(
            "date time c-ip cs-method cs-uri cs-uri-stem cs-uri-query sc-status sc-bytes time-taken x-request-id x-error",
            Box::new(std::io::sink()),
        )
        .unwrap();

        assert_eq!(
            log.format_line(&entry(&ctx)),
            "2024-03-09 14:05:07 10.0.0.5 GET /users/42?x=1 /users/42 x=1 200 7 0.001500 7 -"
        );
    }

    #[test]
    fn test_values_with_spaces_are_quoted() {
        let req = IncomingRequest::new(Method::Get, "/")
            .header("User-Agent", "curl/8.0 (x86_64) \"test\"");
        let mut ctx = finished(req, 404, "");
        ctx.set_error("Cannot determine route for the path '/'".to_string());
        let log = AccessLog::new("cs(User-Agent) x-error c-ip", Box::new(std::io::sink())).unwrap();

        assert_eq!(
            log.format_line(&entry(&ctx)),
            "\"curl/8.0 (x86_64) \"\"test\"\"\" \"Cannot determine route for the path '/'\" -"
        );
    }

    #[test]
    fn test_header_block_and_lines() {
        let sink = MemorySink::default();
        let mut log = AccessLog::new("sc-status sc-bytes", Box::new(sink.clone())).unwrap();
        log.write_header("0.0.0.0:4567".parse().unwrap());
        let ctx = finished(IncomingRequest::new(Method::Get, "/"), 200, "ok");
        log.log(&entry(&ctx));

        let out = sink.contents();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#Version: 1.0");
        assert!(lines[1].starts_with("#Date: "));
        assert_eq!(lines[2], format!("#Software: kettle, version {}", crate::VERSION));
        assert_eq!(lines[3], "#Remark: Server bound to 0.0.0.0 on port 4567");
        assert_eq!(lines[4], "#Remark: W3C Extended Log File Format");
        assert_eq!(lines[5], "#Fields: sc-status sc-bytes");
        assert_eq!(lines[6], "200 2");
    }
}
