//! Radix-tree path matcher.
//!
//! One tree per HTTP method plus one tree for routes that accept any method.
//! O(path-length) lookup via [`matchit`]. Parameter constraints are checked
//! after the tree match and before the handler runs: a request whose `{name}`
//! segment falls outside the name grammar is treated as if the route did not
//! exist.
//!
//! Matching runs on the percent-decoded path, so `/system/function/a%2Db`
//! reaches the `{name}` route as `a-b`. A path that does not decode to UTF-8
//! is matched as received.
//!
//! Build it once at start-up. After [`Gateway::start`](crate::Gateway::start)
//! the router is frozen behind an `Arc` and only ever read.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Methods;
use crate::request::Request;
use crate::response::Response;

/// Returns `true` if `s` is a valid function or namespace name: one or more
/// characters from `[A-Za-z0-9_.-]`.
pub fn is_valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// A rule a captured path parameter must satisfy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Constraint {
    /// The function / namespace name grammar, see [`is_valid_name`].
    Name,
}

impl Constraint {
    fn check(self, value: &str) -> bool {
        match self {
            Self::Name => is_valid_name(value),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
    Exact,
    Suffixed,
    OptionalTail,
}

/// A route template, the methods it answers and the constraints on its
/// parameters.
///
/// A spec may expand to several concrete patterns (trailing slash, arbitrary
/// suffix, omitted final segment); all of them share the spec's template,
/// which is the label instrumentation reports.
#[derive(Clone, Debug)]
pub struct RouteSpec {
    template: String,
    methods: Methods,
    constraints: Vec<(String, Constraint)>,
    shape: Shape,
}

impl RouteSpec {
    /// A route that matches `template` exactly. `template` uses matchit syntax
    /// (`/system/function/{name}`).
    pub fn new(template: impl Into<String>, methods: Methods) -> Self {
        Self {
            template: template.into(),
            methods,
            constraints: Vec::new(),
            shape: Shape::Exact,
        }
    }

    /// Also match `template/` and `template/{*params}`.
    pub fn with_suffixes(mut self) -> Self {
        self.shape = Shape::Suffixed;
        self
    }

    /// Treat the final segment as optional: `/system/namespace/{name}` also
    /// matches `/system/namespace/`.
    pub fn with_optional_tail(mut self) -> Self {
        self.shape = Shape::OptionalTail;
        self
    }

    /// Require parameter `param` to satisfy `constraint`.
    pub fn constrain(mut self, param: impl Into<String>, constraint: Constraint) -> Self {
        self.constraints.push((param.into(), constraint));
        self
    }

    pub fn template(&self) -> &str { &self.template }
    pub fn methods(&self) -> &Methods { &self.methods }

    /// The concrete matchit patterns this spec registers.
    pub fn patterns(&self) -> Vec<String> {
        match self.shape {
            Shape::Exact => vec![self.template.clone()],
            Shape::Suffixed => vec![
                self.template.clone(),
                format!("{}/", self.template),
                format!("{}/{{*params}}", self.template),
            ],
            Shape::OptionalTail => {
                let head = match self.template.rfind('/') {
                    Some(i) => &self.template[..=i],
                    None => "/",
                };
                vec![head.to_owned(), self.template.clone()]
            }
        }
    }
}

/// One row of the bound route table: a concrete pattern and a method
/// (`*` for any).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RouteEntry {
    pub pattern: String,
    pub method: String,
}

const ANY: &str = "*";

#[derive(Clone)]
struct Endpoint {
    handler: BoxedHandler,
    constraints: Arc<[(String, Constraint)]>,
}

impl Endpoint {
    fn admits(&self, params: &matchit::Params<'_, '_>) -> bool {
        self.constraints.iter().all(|(name, rule)| match params.get(name) {
            Some(value) => rule.check(value),
            None => true,
        })
    }
}

pub(crate) enum Lookup {
    Found(BoxedHandler, HashMap<String, String>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// The gateway's path matcher and bound route table.
pub struct Router {
    by_method: HashMap<Method, MatchitRouter<Endpoint>>,
    any: MatchitRouter<Endpoint>,
    table: BTreeSet<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            by_method: HashMap::new(),
            any: MatchitRouter::new(),
            table: BTreeSet::new(),
        }
    }

    /// Binds `handler` to every pattern and method of `spec`.
    ///
    /// Fails if any (method, pattern) pair is already bound, or if a pattern
    /// is rejected by the radix tree.
    pub fn route(&mut self, spec: &RouteSpec, handler: impl Handler) -> Result<(), Error> {
        self.route_boxed(spec, handler.into_boxed_handler())
    }

    pub(crate) fn route_boxed(&mut self, spec: &RouteSpec, handler: BoxedHandler) -> Result<(), Error> {
        let patterns = spec.patterns();
        for pattern in &patterns {
            self.check_free(pattern, spec.methods())?;
        }

        let endpoint = Endpoint {
            handler,
            constraints: spec.constraints.clone().into(),
        };

        for pattern in patterns {
            match spec.methods() {
                Methods::Any => {
                    insert(&mut self.any, &pattern, endpoint.clone())?;
                    self.table.insert(RouteEntry { pattern: pattern.clone(), method: ANY.to_owned() });
                }
                Methods::Only(set) => {
                    for method in set {
                        let tree = self.by_method.entry(method.clone()).or_default();
                        insert(tree, &pattern, endpoint.clone())?;
                        self.table.insert(RouteEntry {
                            pattern: pattern.clone(),
                            method: method.as_str().to_owned(),
                        });
                    }
                }
            }
            tracing::debug!(pattern = %pattern, methods = %spec.methods(), "route bound");
        }
        Ok(())
    }

    fn check_free(&self, pattern: &str, methods: &Methods) -> Result<(), Error> {
        let conflict = |method: &str| Error::RouteConflict {
            method: method.to_owned(),
            pattern: pattern.to_owned(),
        };
        let mut bound = self.table.iter().filter(|e| e.pattern == pattern).map(|e| e.method.as_str());
        match methods {
            Methods::Any => match bound.next() {
                Some(m) => Err(conflict(m)),
                None => Ok(()),
            },
            Methods::Only(set) => match bound.find(|m| *m == ANY || set.iter().any(|s| s.as_str() == *m)) {
                Some(m) => Err(conflict(m)),
                None => Ok(()),
            },
        }
    }

    /// The bound route table, sorted by pattern then method.
    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let exact = self.by_method.get(method).and_then(|tree| matched(tree, path));
        if let Some((handler, params)) = exact.or_else(|| matched(&self.any, path)) {
            return Lookup::Found(handler, params);
        }

        let mut allowed: Vec<Method> = self
            .by_method
            .iter()
            .filter(|(m, tree)| *m != method && matched(tree, path).is_some())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }

    /// Routes one request and produces one response.
    ///
    /// Unknown paths answer `404`; known paths under the wrong method answer
    /// `405` with an `Allow` header.
    pub async fn dispatch(&self, req: Request) -> Response {
        let lookup = self.lookup(req.method(), &decoded(req.path()));
        match lookup {
            Lookup::Found(handler, params) => handler.call(req.with_params(params)).await,
            Lookup::MethodNotAllowed(allowed) => {
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                let builder = Response::builder().status(StatusCode::METHOD_NOT_ALLOWED);
                match HeaderValue::from_str(&allow) {
                    Ok(value) => builder.header(ALLOW, value).no_body(),
                    Err(_) => builder.no_body(),
                }
            }
            Lookup::NotFound => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .text("404 page not found"),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn insert(tree: &mut MatchitRouter<Endpoint>, pattern: &str, endpoint: Endpoint) -> Result<(), Error> {
    tree.insert(pattern, endpoint).map_err(|source| Error::InvalidRoute {
        pattern: pattern.to_owned(),
        source,
    })
}

fn decoded(path: &str) -> Cow<'_, str> {
    percent_decode_str(path).decode_utf8().unwrap_or(Cow::Borrowed(path))
}

fn matched(tree: &MatchitRouter<Endpoint>, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
    let m = tree.at(path).ok()?;
    if !m.value.admits(&m.params) {
        return None;
    }
    let params = m.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
    Some((Arc::clone(&m.value.handler), params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn req(method: Method, path: &str) -> Request {
        Request::from_http(
            http::Request::builder().method(method).uri(path).body(Bytes::new()).unwrap(),
        )
    }

    async fn echo_name(req: Request) -> Response {
        Response::text(format!(
            "{}|{}",
            req.param("name").unwrap_or(""),
            req.param("params").unwrap_or("")
        ))
    }

    fn proxy_spec() -> RouteSpec {
        RouteSpec::new("/function/{name}", Methods::Any)
            .with_suffixes()
            .constrain("name", Constraint::Name)
    }

    #[test]
    fn name_grammar() {
        assert!(is_valid_name("figlet"));
        assert!(is_valid_name("nodeinfo-1.2_beta"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("bad name"));
        assert!(!is_valid_name("a%20b"));
        assert!(!is_valid_name("ünicode"));
    }

    #[test]
    fn route_shapes_expand_to_patterns() {
        assert_eq!(
            proxy_spec().patterns(),
            vec!["/function/{name}", "/function/{name}/", "/function/{name}/{*params}"]
        );
        let ns = RouteSpec::new("/system/namespace/{name}", Methods::one(Method::GET)).with_optional_tail();
        assert_eq!(ns.patterns(), vec!["/system/namespace/", "/system/namespace/{name}"]);
    }

    #[tokio::test]
    async fn suffix_variants_reach_the_same_handler() {
        let mut router = Router::new();
        router.route(&proxy_spec(), echo_name).unwrap();

        for (path, expected) in [
            ("/function/echo", "echo|"),
            ("/function/echo/", "echo|"),
            ("/function/echo/extra/path", "echo|extra/path"),
        ] {
            let res = router.dispatch(req(Method::POST, path)).await;
            assert_eq!(res.status_code(), StatusCode::OK, "{path}");
            assert_eq!(res.body().as_ref(), expected.as_bytes(), "{path}");
        }
    }

    #[tokio::test]
    async fn constraint_failure_is_not_found() {
        let mut router = Router::new();
        router.route(&proxy_spec(), echo_name).unwrap();

        for path in ["/function/", "/function/bad%20name", "/function/a$b/x"] {
            let res = router.dispatch(req(Method::GET, path)).await;
            assert_eq!(res.status_code(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn encoded_paths_match_after_decoding() {
        let mut router = Router::new();
        router.route(&proxy_spec(), echo_name).unwrap();
        router
            .route(&RouteSpec::new("/system/info", Methods::one(Method::GET)), echo_name)
            .unwrap();

        let res = router.dispatch(req(Method::GET, "/function/a%2Db/x%2Fy")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(&res.body()[..], b"a-b|x/y");

        let res = router.dispatch(req(Method::GET, "/system/%69nfo")).await;
        assert_eq!(res.status_code(), StatusCode::OK);

        let res = router.dispatch(req(Method::GET, "/function/%FF")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_method_not_allowed() {
        let mut router = Router::new();
        router
            .route(&RouteSpec::new("/system/metrics", Methods::of(&[Method::GET, Method::DELETE])), echo_name)
            .unwrap();

        let res = router.dispatch(req(Method::POST, "/system/metrics")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[ALLOW], "DELETE, GET");

        let res = router.dispatch(req(Method::GET, "/nowhere")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_method_and_pattern_is_a_conflict() {
        let mut router = Router::new();
        let spec = RouteSpec::new("/system/functions", Methods::one(Method::GET));
        router.route(&spec, echo_name).unwrap();
        router
            .route(&RouteSpec::new("/system/functions", Methods::one(Method::POST)), echo_name)
            .unwrap();

        let err = router.route(&spec, echo_name).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { ref method, .. } if method == "GET"));

        let err = router
            .route(&RouteSpec::new("/system/functions", Methods::Any), echo_name)
            .unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn route_table_is_sorted() {
        let mut router = Router::new();
        router.route(&RouteSpec::new("/b", Methods::one(Method::PUT)), echo_name).unwrap();
        router.route(&RouteSpec::new("/a", Methods::one(Method::GET)), echo_name).unwrap();

        let rows: Vec<_> = router.routes().map(|e| (e.pattern.as_str(), e.method.as_str())).collect();
        assert_eq!(rows, vec![("/a", "GET"), ("/b", "PUT")]);
    }
}
