//! # Request Body Parsing
//!
//! Decodes `application/x-www-form-urlencoded` and `multipart/form-data`
//! bodies into form fields and uploaded files. Other content types produce an
//! empty result.
//!
//! The declared `Content-Length` is checked before anything is decoded: a body
//! longer than announced is rejected outright.

use crate::error::RequestError;
use crate::request::scrub_nul;
use hyper::body::Bytes;
use std::collections::HashMap;

/// A file part of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// Client-side filename (may be empty)
    pub filename: String,
    /// Part content type, if the client sent one
    pub content_type: Option<String>,
    /// File contents
    pub data: Bytes,
}

/// Fields and files decoded from a request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBody {
    /// Form fields, last value wins
    pub fields: HashMap<String, String>,
    /// Uploaded files in body order
    pub files: Vec<UploadedFile>,
}

/// Decode a request body
///
/// # Arguments
///
/// * `content_type` - Raw `Content-Type` header value
/// * `content_length` - Declared length; `None` counts as 0
/// * `body` - Buffered body
///
/// # Errors
///
/// Returns `RequestError::BodyLengthMismatch` when `body` is longer than the
/// declared length.
pub fn parse_body(
    content_type: Option<&str>,
    content_length: Option<usize>,
    body: &Bytes,
) -> Result<ParsedBody, RequestError> {
    let declared = content_length.unwrap_or(0);
    if body.len() > declared {
        return Err(RequestError::BodyLengthMismatch {
            actual: body.len(),
            declared,
        });
    }

    let mut parsed = ParsedBody::default();
    let Some(content_type) = content_type else {
        return Ok(parsed);
    };
    let lowered = content_type.to_ascii_lowercase();

    if lowered.contains("multipart/form-data") {
        match header_param(content_type, "boundary") {
            Some(boundary) if !boundary.is_empty() => {
                parse_multipart(body, &boundary, &mut parsed);
            }
            _ => tracing::debug!("multipart body without boundary ignored"),
        }
    } else if lowered.contains("application/x-www-form-urlencoded") {
        parsed.fields = parse_urlencoded(body);
    }

    Ok(parsed)
}

/// Decode `key=value&...` pairs (`+` and `%XX` aware, last value wins)
#[must_use]
pub fn parse_urlencoded(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (scrub_nul(&k), scrub_nul(&v)))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

fn parse_multipart(body: &Bytes, boundary: &str, parsed: &mut ParsedBody) {
    // A delimiter only counts at the start of the body or right after a CRLF.
    let delimiter = format!("\r\n--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut cursor = if body.starts_with(&delimiter[2..]) {
        delimiter.len() - 2
    } else if let Some(first) = find(body, delimiter, 0) {
        first + delimiter.len()
    } else {
        return;
    };

    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        let part_start = if body[cursor..].starts_with(b"\r\n") {
            cursor + 2
        } else {
            cursor
        };
        let Some(part_end) = find(body, delimiter, part_start) else {
            break;
        };

        parse_part(&body.slice(part_start..part_end), parsed);
        cursor = part_end + delimiter.len();
    }
}

fn parse_part(part: &Bytes, parsed: &mut ParsedBody) {
    let (head, data) = if part.starts_with(b"\r\n") {
        (&part[..0], part.slice(2..))
    } else if let Some(split) = find(part, b"\r\n\r\n", 0) {
        (&part[..split], part.slice(split + 4..))
    } else {
        return;
    };

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for (header, value) in part_headers(&String::from_utf8_lossy(head)) {
        if header.eq_ignore_ascii_case("content-disposition") {
            name = header_param(&value, "name");
            filename = header_param(&value, "filename");
        } else if header.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let Some(field) = name.map(|n| scrub_nul(&n)) else {
        return;
    };

    match filename {
        Some(filename) => parsed.files.push(UploadedFile {
            field,
            filename: scrub_nul(&filename),
            content_type,
            data,
        }),
        None => {
            let value = scrub_nul(&String::from_utf8_lossy(&data));
            parsed.fields.insert(field, value);
        }
    }
}

/// Split a part header block into `(name, value)` pairs, unfolding
/// continuation lines.
fn part_headers(block: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in block.split("\r\n") {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

/// Extract a `; key=value` parameter from a header value
///
/// Quoted values may contain `;`.
pub(crate) fn header_param(value: &str, key: &str) -> Option<String> {
    split_unquoted(value, ';')
        .into_iter()
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| {
            let v = v.trim();
            v.strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(v)
                .to_string()
        })
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = "application/x-www-form-urlencoded";

    fn multipart_body() -> Bytes {
        Bytes::from_static(
            b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
Hello world\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"notes; v2.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
line one\r\nline two\r\n\
--XyZ--\r\n",
        )
    }

    #[test]
    fn test_urlencoded_body() {
        let body = Bytes::from_static(b"a=1&b=2");
        let parsed = parse_body(Some(FORM), Some(7), &body).unwrap();
        assert_eq!(parsed.fields.get("a"), Some(&"1".to_string()));
        assert_eq!(parsed.fields.get("b"), Some(&"2".to_string()));
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn test_urlencoded_decoding_and_last_wins() {
        let body = Bytes::from_static(b"name=John+Doe&city=New%20York&name=Jane");
        let parsed = parse_body(Some("application/x-www-form-urlencoded; charset=UTF-8"), Some(body.len()), &body).unwrap();
        assert_eq!(parsed.fields.get("name"), Some(&"Jane".to_string()));
        assert_eq!(parsed.fields.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_body_longer_than_declared() {
        let body = Bytes::from_static(b"a=1&b=2&c=3");
        let err = parse_body(Some(FORM), Some(7), &body).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(
            err.to_string(),
            "Actual POST length 11 does not match Content-Length 7"
        );
    }

    #[test]
    fn test_missing_content_length_counts_as_zero() {
        let body = Bytes::from_static(b"a=1");
        assert!(parse_body(Some(FORM), None, &body).is_err());
        assert!(parse_body(Some(FORM), None, &Bytes::new()).unwrap().fields.is_empty());
    }

    #[test]
    fn test_shorter_body_is_accepted() {
        let body = Bytes::from_static(b"a=1");
        let parsed = parse_body(Some(FORM), Some(100), &body).unwrap();
        assert_eq!(parsed.fields.get("a"), Some(&"1".to_string()));
    }

    #[test]
    fn test_unknown_content_type_is_empty() {
        let body = Bytes::from_static(br#"{"a":1}"#);
        let parsed = parse_body(Some("application/json"), Some(body.len()), &body).unwrap();
        assert_eq!(parsed, ParsedBody::default());
        let parsed = parse_body(None, Some(body.len()), &body).unwrap();
        assert_eq!(parsed, ParsedBody::default());
    }

    #[test]
    fn test_multipart_fields_and_files() {
        let body = multipart_body();
        let parsed = parse_body(
            Some("multipart/form-data; boundary=XyZ"),
            Some(body.len()),
            &body,
        )
        .unwrap();

        assert_eq!(parsed.fields.get("title"), Some(&"Hello world".to_string()));
        assert_eq!(parsed.files.len(), 1);
        let file = &parsed.files[0];
        assert_eq!(file.field, "upload");
        assert_eq!(file.filename, "notes; v2.txt");
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(&file.data[..], b"line one\r\nline two");
    }

    #[test]
    fn test_multipart_quoted_boundary() {
        let body = multipart_body();
        let parsed = parse_body(
            Some("multipart/form-data; boundary=\"XyZ\""),
            Some(body.len()),
            &body,
        )
        .unwrap();
        assert_eq!(parsed.fields.len(), 1);
    }

    #[test]
    fn test_multipart_without_boundary_is_empty() {
        let body = multipart_body();
        let parsed = parse_body(Some("multipart/form-data"), Some(body.len()), &body).unwrap();
        assert_eq!(parsed, ParsedBody::default());
    }

    #[test]
    fn test_multipart_folded_header() {
        let body = Bytes::from_static(
            b"--b\r\nContent-Disposition: form-data;\r\n name=\"x\"\r\n\r\nv\r\n--b--",
        );
        let parsed = parse_body(Some("multipart/form-data; boundary=b"), Some(body.len()), &body).unwrap();
        assert_eq!(parsed.fields.get("x"), Some(&"v".to_string()));
    }

    #[test]
    fn test_multipart_empty_filename_is_file() {
        let body = Bytes::from_static(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"\"\r\n\r\n\r\n--XyZ--\r\n",
        );
        let parsed = parse_body(Some("multipart/form-data; boundary=XyZ"), Some(body.len()), &body).unwrap();
        assert!(parsed.fields.is_empty());
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].field, "doc");
        assert_eq!(parsed.files[0].filename, "");
        assert!(parsed.files[0].data.is_empty());
    }

    #[test]
    fn test_multipart_boundary_text_inside_content() {
        let body = Bytes::from_static(
            b"preamble --XyZ here\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"a\"; filename=\"a.txt\"\r\n\
\r\n\
abc--XyZdef\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"b\"; filename=\"b.bin\"\r\n\
Content-Type: application/octet-stream\r\n\
\r\n\
\x00\x01\r\nx--XyZ\r\n\xff\r\n\
--XyZ--\r\n",
        );
        let parsed = parse_body(Some("multipart/form-data; boundary=XyZ"), Some(body.len()), &body).unwrap();

        assert_eq!(parsed.files.len(), 2);
        assert_eq!(parsed.files[0].filename, "a.txt");
        assert_eq!(&parsed.files[0].data[..], b"abc--XyZdef");
        assert_eq!(parsed.files[1].filename, "b.bin");
        assert_eq!(
            parsed.files[1].content_type.as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(&parsed.files[1].data[..], b"\x00\x01\r\nx--XyZ\r\n\xff");
    }

    #[test]
    fn test_nul_bytes_scrubbed() {
        let body = Bytes::from_static(b"na%00me=va%00lue");
        let parsed = parse_body(Some(FORM), Some(body.len()), &body).unwrap();
        assert_eq!(parsed.fields.get("name"), Some(&"value".to_string()));
    }

    #[test]
    fn test_header_param() {
        assert_eq!(
            header_param("form-data; name=\"a\"; filename=\"b.txt\"", "filename"),
            Some("b.txt".to_string())
        );
        assert_eq!(header_param("form-data; name=a", "NAME"), Some("a".to_string()));
        assert_eq!(header_param("form-data", "name"), None);
    }
}
