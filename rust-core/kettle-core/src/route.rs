//! # Route Definitions
//!
//! A [`RouteSpec`] is what applications hand to the route table: a method
//! set, a path, a handler and the cast declarations for its parameters.
//!
//! Path templates:
//!
//! - `/users` - literal, matched exactly
//! - `/users/:id` - `:name` captures one segment
//! - `/files/*rest` - `*name` captures the remainder of the path
//! - `/users/:id{integer}` - a `{cast}` suffix declares the parameter cast
//!
//! Hand-written regular expressions with named groups are accepted through
//! [`RouteSpec::regex`].

use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerResult};
use crate::request::RequestContext;
use crate::router::Method;
use crate::types::{ParamCast, PathParams};
use std::collections::HashMap;
use std::sync::Arc;

/// Path portion of a route definition, before compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePath {
    /// Template using `:name` / `*name` segments
    Template(String),
    /// Raw regular expression with named groups
    Regex(String),
}

/// Compiled form of a [`RoutePath`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatcher {
    /// Exact literal path
    Literal(String),
    /// Anchored regular expression source
    Pattern(String),
}

/// Route registration request
pub struct RouteSpec {
    pub(crate) methods: Vec<Method>,
    pub(crate) path: RoutePath,
    pub(crate) handler: Handler,
    pub(crate) casts: HashMap<String, ParamCast>,
}

impl std::fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSpec")
            .field("methods", &self.methods)
            .field("path", &self.path)
            .field("casts", &self.casts)
            .finish_non_exhaustive()
    }
}

impl RouteSpec {
    /// Create a route from a path template
    ///
    /// # Arguments
    ///
    /// * `methods` - Methods this route answers
    /// * `path` - Literal path or template (e.g. `/users/:id{integer}`)
    /// * `handler` - Callable invoked with the request context and path params
    pub fn new<I, F>(methods: I, path: &str, handler: F) -> Self
    where
        I: IntoIterator<Item = Method>,
        F: Fn(&mut RequestContext, &PathParams) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            methods: methods.into_iter().collect(),
            path: RoutePath::Template(path.to_string()),
            handler: Arc::new(handler),
            casts: HashMap::new(),
        }
    }

    /// Create a route from a regular expression with named groups
    ///
    /// The expression is anchored automatically when `^` / `$` are missing.
    pub fn regex<I, F>(methods: I, pattern: &str, handler: F) -> Self
    where
        I: IntoIterator<Item = Method>,
        F: Fn(&mut RequestContext, &PathParams) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            path: RoutePath::Regex(pattern.to_string()),
            ..Self::new(methods, "", handler)
        }
    }

    /// Convenience constructor for a GET route
    pub fn get<F>(path: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &PathParams) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new([Method::Get], path, handler)
    }

    /// Convenience constructor for a POST route
    pub fn post<F>(path: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &PathParams) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new([Method::Post], path, handler)
    }

    /// Declare (or override) the cast for a parameter
    #[must_use]
    pub fn cast(mut self, name: &str, cast: ParamCast) -> Self {
        self.casts.insert(name.to_string(), cast);
        self
    }

    /// Methods this route answers
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

/// Compile a route path into a matcher plus the casts declared inline
///
/// # Errors
///
/// Returns `Error::InvalidRoutePattern` for empty parameter names or unknown
/// cast specifiers.
pub fn compile_path(path: &RoutePath) -> Result<(PathMatcher, HashMap<String, ParamCast>)> {
    match path {
        RoutePath::Regex(source) => Ok((PathMatcher::Pattern(anchor(source)), HashMap::new())),
        RoutePath::Template(template) => compile_template(template),
    }
}

fn anchor(source: &str) -> String {
    let mut anchored = String::with_capacity(source.len() + 2);
    if !source.starts_with('^') {
        tracing::warn!(pattern = %source, "route pattern is not anchored at start, adding '^'");
        anchored.push('^');
    }
    anchored.push_str(source);
    if !source.ends_with('$') {
        tracing::warn!(pattern = %source, "route pattern is not anchored at end, adding '$'");
        anchored.push('$');
    }
    anchored
}

fn compile_template(template: &str) -> Result<(PathMatcher, HashMap<String, ParamCast>)> {
    let invalid = |reason: String| Error::InvalidRoutePattern {
        pattern: template.to_string(),
        reason,
    };

    if !template.starts_with('/') {
        return Err(invalid("path must start with '/'".to_string()));
    }

    let mut casts = HashMap::new();
    let mut pieces = Vec::new();
    let mut has_params = false;

    for segment in template.split('/') {
        let (kind, rest) = match segment.chars().next() {
            Some(c @ (':' | '*')) => (c, &segment[1..]),
            _ => {
                pieces.push(regex::escape(segment));
                continue;
            }
        };

        let (name, cast) = match rest.split_once('{') {
            Some((name, spec)) => {
                let spec = spec
                    .strip_suffix('}')
                    .ok_or_else(|| invalid(format!("unterminated cast in segment '{segment}'")))?;
                let cast = ParamCast::from_specifier(spec)
                    .ok_or_else(|| invalid(format!("unknown cast '{spec}'")))?;
                (name, Some(cast))
            }
            None => (rest, None),
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(format!("invalid parameter name '{name}'")));
        }
        if let Some(cast) = cast {
            casts.insert(name.to_string(), cast);
        }

        has_params = true;
        let class = if kind == '*' { ".+" } else { "[^/]+" };
        pieces.push(format!("(?P<{name}>{class})"));
    }

    if has_params {
        Ok((PathMatcher::Pattern(format!("^{}$", pieces.join("/"))), casts))
    } else {
        Ok((PathMatcher::Literal(template.to_string()), casts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(path: &str) -> (PathMatcher, HashMap<String, ParamCast>) {
        compile_path(&RoutePath::Template(path.to_string())).unwrap()
    }

    #[test]
    fn test_literal_path() {
        let (matcher, casts) = template("/users");
        assert_eq!(matcher, PathMatcher::Literal("/users".to_string()));
        assert!(casts.is_empty());
    }

    #[test]
    fn test_root_is_literal() {
        let (matcher, _) = template("/");
        assert_eq!(matcher, PathMatcher::Literal("/".to_string()));
    }

    #[test]
    fn test_segment_param_with_cast() {
        let (matcher, casts) = template("/users/:id{integer}");
        assert_eq!(
            matcher,
            PathMatcher::Pattern("^/users/(?P<id>[^/]+)$".to_string())
        );
        assert_eq!(casts.get("id"), Some(&ParamCast::Integer));
    }

    #[test]
    fn test_rest_param() {
        let (matcher, casts) = template("/static/*file{path}");
        assert_eq!(
            matcher,
            PathMatcher::Pattern("^/static/(?P<file>.+)$".to_string())
        );
        assert_eq!(casts.get("file"), Some(&ParamCast::SafePath));
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        let (matcher, _) = template("/v1.0/:name");
        assert_eq!(
            matcher,
            PathMatcher::Pattern(r"^/v1\.0/(?P<name>[^/]+)$".to_string())
        );
    }

    #[test]
    fn test_regex_is_anchored() {
        let (matcher, _) =
            compile_path(&RoutePath::Regex("/items/(?P<id>\\d+)".to_string())).unwrap();
        assert_eq!(
            matcher,
            PathMatcher::Pattern("^/items/(?P<id>\\d+)$".to_string())
        );
    }

    #[test]
    fn test_invalid_templates() {
        for bad in ["users", "/users/:", "/users/:id{uuid}", "/users/:id{integer", "/a/:b-c"] {
            assert!(
                compile_path(&RoutePath::Template(bad.to_string())).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_explicit_cast_builder() {
        let spec = RouteSpec::get("/users/:id", |_, _| Ok("ok".into()))
            .cast("id", ParamCast::Integer);
        assert_eq!(spec.casts.get("id"), Some(&ParamCast::Integer));
        assert_eq!(spec.methods(), &[Method::Get]);
    }
}
