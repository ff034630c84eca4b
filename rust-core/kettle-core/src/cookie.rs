//! # Cookie Parsing
//!
//! Decodes a `Cookie` request header into a name/value map.

use crate::request::{scrub_nul, url_decode};
use std::collections::HashMap;

/// Parse a `Cookie` header
///
/// - pairs are split on `;`, leading whitespace is trimmed from each name
/// - a token without `=` yields an empty value
/// - tokens with an empty name are skipped
/// - names and values are percent-decoded and NUL-scrubbed
/// - duplicate names: last one wins
#[must_use]
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim_start();
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if name.trim().is_empty() {
                return None;
            }
            Some((
                scrub_nul(&url_decode(name)),
                scrub_nul(&url_decode(value)),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_cookies() {
        let cookies = parse_cookies("a=1; b=2; c");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("a"), Some(&"1".to_string()));
        assert_eq!(cookies.get("b"), Some(&"2".to_string()));
        assert_eq!(cookies.get("c"), Some(&String::new()));
    }

    #[test]
    fn test_empty_names_skipped() {
        let cookies = parse_cookies("; =x;  ;a=1");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("a"), Some(&"1".to_string()));
    }

    #[test]
    fn test_value_keeps_equals_and_decodes() {
        let cookies = parse_cookies("token=abc==; name=J%C3%B6rg; bad=%zz");
        assert_eq!(cookies.get("token"), Some(&"abc==".to_string()));
        assert_eq!(cookies.get("name"), Some(&"Jörg".to_string()));
        assert_eq!(cookies.get("bad"), Some(&"%zz".to_string()));
    }

    #[test]
    fn test_last_duplicate_wins_and_nul_scrubbed() {
        let cookies = parse_cookies("id=1; id=2%00x");
        assert_eq!(cookies.get("id"), Some(&"2x".to_string()));
    }

    #[test]
    fn test_empty_header() {
        assert!(parse_cookies("").is_empty());
    }
}
