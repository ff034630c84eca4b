//! # Route Table
//!
//! Resolves `(method, path)` to a registered route and its raw path
//! parameters.
//!
//! ## Lookup order
//!
//! 1. Exact literal lookup for the method. A literal always beats a pattern.
//! 2. The method's patterns, in registration order. First match wins.
//! 3. Nothing matched: if the path matches any pattern or literal registered
//!    under another method the answer is 405, otherwise 404.
//!
//! Patterns are compiled once at registration and cached by source string, so
//! routes sharing a pattern share one `Regex`.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::request::url_decode;
use crate::route::{compile_path, PathMatcher, RouteSpec};
use crate::types::{ParamCast, PathParams};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// HTTP methods accepted by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP HEAD
    Head,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP OPTIONS
    Options,
    /// HTTP TRACE
    Trace,
    /// HTTP CONNECT
    Connect,
    /// HTTP PATCH
    Patch,
}

impl Method {
    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Patch => "PATCH",
        }
    }

    /// Map a hyper method; `None` for extension methods
    #[must_use]
    pub fn from_hyper(method: &hyper::Method) -> Option<Self> {
        Some(match *method {
            hyper::Method::GET => Self::Get,
            hyper::Method::POST => Self::Post,
            hyper::Method::HEAD => Self::Head,
            hyper::Method::PUT => Self::Put,
            hyper::Method::DELETE => Self::Delete,
            hyper::Method::OPTIONS => Self::Options,
            hyper::Method::TRACE => Self::Trace,
            hyper::Method::CONNECT => Self::Connect,
            hyper::Method::PATCH => Self::Patch,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route identifier, assigned in registration order
pub type RouteId = usize;

/// A registered route
pub struct Route {
    /// Route identifier
    pub id: RouteId,
    /// Methods this route answers
    pub methods: Vec<Method>,
    /// Compiled path
    pub matcher: PathMatcher,
    /// Casts for captured parameters
    pub casts: HashMap<String, ParamCast>,
    pub(crate) handler: Handler,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("methods", &self.methods)
            .field("matcher", &self.matcher)
            .field("casts", &self.casts)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`RouteTable::resolve`]
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A route matched
    Found {
        /// Matched route
        route: RouteId,
        /// Raw (percent-decoded, uncast) captures
        params: PathParams,
    },
    /// Nothing is registered for this path
    NotFound,
    /// The path is registered under other methods
    MethodNotAllowed {
        /// Methods that would have matched, in canonical order
        allow: Vec<Method>,
    },
}

/// Per-method storage for routes
#[derive(Default)]
struct MethodRoutes {
    literals: HashMap<String, RouteId>,
    patterns: Vec<(Arc<Regex>, RouteId)>,
}

/// Route table with exact and pattern routes
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    method_routes: HashMap<Method, MethodRoutes>,
    /// Every pattern with the methods it was registered for (405 detection)
    global_patterns: Vec<(Arc<Regex>, Vec<Method>)>,
    /// Every literal with the methods it was registered for (405 detection)
    global_literals: HashMap<String, Vec<Method>>,
    compiled: HashMap<String, Arc<Regex>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route
    ///
    /// Casts declared inline in the template are merged with those set via
    /// [`RouteSpec::cast`]; explicit ones win.
    ///
    /// # Returns
    ///
    /// The id assigned to this route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the path does not compile, the
    /// route has no methods, or a literal path is already registered for one
    /// of its methods.
    pub fn add(&mut self, spec: RouteSpec) -> Result<RouteId> {
        let RouteSpec {
            methods,
            path,
            handler,
            casts: explicit_casts,
        } = spec;

        let (matcher, mut casts) = compile_path(&path)?;
        let source = match &matcher {
            PathMatcher::Literal(p) | PathMatcher::Pattern(p) => p.clone(),
        };

        let methods: Vec<Method> = methods
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if methods.is_empty() {
            return Err(Error::InvalidRoutePattern {
                pattern: source,
                reason: "route has no methods".to_string(),
            });
        }
        casts.extend(explicit_casts);

        let id = self.routes.len();
        match &matcher {
            PathMatcher::Literal(path) => {
                for method in &methods {
                    let taken = self
                        .method_routes
                        .get(method)
                        .is_some_and(|r| r.literals.contains_key(path));
                    if taken {
                        return Err(Error::InvalidRoutePattern {
                            pattern: path.clone(),
                            reason: format!("{method} {path} is already registered"),
                        });
                    }
                }
                for method in &methods {
                    self.method_routes
                        .entry(*method)
                        .or_default()
                        .literals
                        .insert(path.clone(), id);
                }
                self.global_literals
                    .entry(path.clone())
                    .or_default()
                    .extend(methods.iter().copied());
            }
            PathMatcher::Pattern(pattern) => {
                let regex = self.compile(pattern)?;
                for method in &methods {
                    self.method_routes
                        .entry(*method)
                        .or_default()
                        .patterns
                        .push((Arc::clone(&regex), id));
                }
                self.global_patterns.push((regex, methods.clone()));
            }
        }

        tracing::debug!(route = id, path = %source, methods = ?methods, "route registered");

        self.routes.push(Route {
            id,
            methods,
            matcher,
            casts,
            handler,
        });
        Ok(id)
    }

    fn compile(&mut self, pattern: &str) -> Result<Arc<Regex>> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(Arc::clone(regex));
        }
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let regex = Arc::new(regex);
        self.compiled.insert(pattern.to_string(), Arc::clone(&regex));
        Ok(regex)
    }

    /// Resolve a request to a route
    ///
    /// Pure with respect to the table: the same input always yields the same
    /// resolution.
    #[must_use]
    pub fn resolve(&self, method: Method, path: &str) -> Resolution {
        if let Some(routes) = self.method_routes.get(&method) {
            if let Some(&route) = routes.literals.get(path) {
                return Resolution::Found {
                    route,
                    params: PathParams::new(),
                };
            }

            for (regex, route) in &routes.patterns {
                if let Some(caps) = regex.captures(path) {
                    let params = regex
                        .capture_names()
                        .flatten()
                        .filter_map(|name| {
                            caps.name(name)
                                .map(|m| (name.to_string(), url_decode(m.as_str())))
                        })
                        .collect();
                    return Resolution::Found {
                        route: *route,
                        params,
                    };
                }
            }
        }

        let mut allow: BTreeSet<Method> = BTreeSet::new();
        if let Some(methods) = self.global_literals.get(path) {
            allow.extend(methods.iter().copied());
        }
        for (regex, methods) in &self.global_patterns {
            if regex.is_match(path) {
                allow.extend(methods.iter().copied());
            }
        }
        allow.remove(&method);

        if allow.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed {
                allow: allow.into_iter().collect(),
            }
        }
    }

    /// Look up a route by id
    #[must_use]
    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Number of distinct compiled patterns
    #[must_use]
    pub fn compiled_patterns(&self) -> usize {
        self.compiled.len()
    }
}
