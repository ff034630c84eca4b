//! # Path Parameter Types
//!
//! Casting policy for values captured from pattern routes.
//!
//! Each route declares, per parameter name, a [`ParamCast`]. Casts are fixed at
//! registration time and applied after the route is resolved:
//!
//! - `Integer` / `Double` are permissive: a value that does not parse stays a
//!   string and the request proceeds.
//! - `SafePath` is strict: NUL bytes or `..` segments reject the request.
//! - `Raw` leaves the value untouched.

use crate::error::RequestError;
use std::collections::HashMap;
use std::fmt;

/// Declared conversion for a path parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamCast {
    /// No conversion
    #[default]
    Raw,
    /// Parse to `i64`
    Integer,
    /// Parse to `f64`
    Double,
    /// Keep as string, reject traversal and NUL bytes
    SafePath,
}

impl ParamCast {
    /// Parse a cast specifier from a route template (e.g. `integer` in `:id{integer}`)
    ///
    /// Returns `None` for unknown specifiers.
    #[must_use]
    pub fn from_specifier(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Some(Self::Integer),
            "double" | "float" => Some(Self::Double),
            "path" => Some(Self::SafePath),
            "raw" | "string" => Some(Self::Raw),
            _ => None,
        }
    }

    /// Specifier name, as accepted by [`ParamCast::from_specifier`]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::SafePath => "path",
        }
    }
}

impl fmt::Display for ParamCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Path parameter value after casting
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// String value (raw, safe path, or a numeric cast that did not parse)
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
}

impl ParamValue {
    /// Borrow as `&str` if String variant
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if Int variant
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if Float variant
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Named path parameters of a resolved request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathParams {
    values: HashMap<String, ParamValue>,
}

impl PathParams {
    /// Create an empty parameter map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    /// Get a parameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Get a string parameter
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Get an integer parameter
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    /// Get a float parameter
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the route captured nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, String)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k, ParamValue::String(v)))
                .collect(),
        }
    }
}

/// Cast one raw value
///
/// # Errors
///
/// Returns `RequestError::InvalidPathParameter` when a `SafePath` value
/// contains a NUL byte or a `..` segment.
pub fn cast_value(name: &str, raw: String, cast: ParamCast) -> Result<ParamValue, RequestError> {
    match cast {
        ParamCast::Raw => Ok(ParamValue::String(raw)),
        ParamCast::Integer => Ok(raw
            .parse::<i64>()
            .map_or(ParamValue::String(raw), ParamValue::Int)),
        ParamCast::Double => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(ParamValue::Float(v)),
            _ => Ok(ParamValue::String(raw)),
        },
        ParamCast::SafePath => {
            if is_safe_path(&raw) {
                Ok(ParamValue::String(raw))
            } else {
                Err(RequestError::InvalidPathParameter {
                    name: name.to_string(),
                })
            }
        }
    }
}

/// Apply declared casts in place
///
/// Casts naming a parameter the route did not capture are ignored.
///
/// # Errors
///
/// Propagates the first `SafePath` rejection.
pub fn apply_casts(
    params: &mut PathParams,
    casts: &HashMap<String, ParamCast>,
) -> Result<(), RequestError> {
    for (name, cast) in casts {
        let Some(ParamValue::String(raw)) = params.values.get(name) else {
            continue;
        };
        let value = cast_value(name, raw.clone(), *cast)?;
        params.values.insert(name.clone(), value);
    }
    Ok(())
}

fn is_safe_path(value: &str) -> bool {
    !value.contains('\0') && !value.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> PathParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_cast_from_specifier() {
        assert_eq!(ParamCast::from_specifier("integer"), Some(ParamCast::Integer));
        assert_eq!(ParamCast::from_specifier("INT"), Some(ParamCast::Integer));
        assert_eq!(ParamCast::from_specifier("double"), Some(ParamCast::Double));
        assert_eq!(ParamCast::from_specifier("path"), Some(ParamCast::SafePath));
        assert_eq!(ParamCast::from_specifier("raw"), Some(ParamCast::Raw));
        assert_eq!(ParamCast::from_specifier("uuid"), None);
    }

    #[test]
    fn test_integer_cast() {
        let mut params = raw(&[("id", "42")]);
        let casts = HashMap::from([("id".to_string(), ParamCast::Integer)]);
        apply_casts(&mut params, &casts).unwrap();
        assert_eq!(params.get_int("id"), Some(42));
    }

    #[test]
    fn test_numeric_cast_failure_keeps_string() {
        let mut params = raw(&[("id", "abc"), ("price", "cheap")]);
        let casts = HashMap::from([
            ("id".to_string(), ParamCast::Integer),
            ("price".to_string(), ParamCast::Double),
        ]);
        apply_casts(&mut params, &casts).unwrap();
        assert_eq!(params.get_str("id"), Some("abc"));
        assert_eq!(params.get_str("price"), Some("cheap"));
    }

    #[test]
    fn test_double_cast() {
        let mut params = raw(&[("price", "19.99")]);
        let casts = HashMap::from([("price".to_string(), ParamCast::Double)]);
        apply_casts(&mut params, &casts).unwrap();
        assert_eq!(params.get_float("price"), Some(19.99));
    }

    #[test]
    fn test_safe_path_accepts_nested() {
        let mut params = raw(&[("file", "docs/guide/intro.md")]);
        let casts = HashMap::from([("file".to_string(), ParamCast::SafePath)]);
        apply_casts(&mut params, &casts).unwrap();
        assert_eq!(params.get_str("file"), Some("docs/guide/intro.md"));
    }

    #[test]
    fn test_safe_path_rejects_traversal_and_nul() {
        let casts = HashMap::from([("file".to_string(), ParamCast::SafePath)]);

        let mut params = raw(&[("file", "../etc/passwd")]);
        let err = apply_casts(&mut params, &casts).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.to_string(), "Detected invalid characters in the URI.");

        let mut params = raw(&[("file", "a\\..\\b")]);
        assert!(apply_casts(&mut params, &casts).is_err());

        let mut params = raw(&[("file", "a\0b")]);
        assert!(apply_casts(&mut params, &casts).is_err());
    }

    #[test]
    fn test_cast_for_absent_param_is_noop() {
        let mut params = PathParams::new();
        let casts = HashMap::from([("id".to_string(), ParamCast::Integer)]);
        apply_casts(&mut params, &casts).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_param_value_display() {
        assert_eq!(ParamValue::Int(42).to_string(), "42");
        assert_eq!(ParamValue::String("x".into()).to_string(), "x");
    }
}
