//! Route binder.
//!
//! The mapping from capabilities to routes is static and lives in one table,
//! [`table`]. Each row names the capability, the route it is bound to, what
//! happens when the capability is absent, and whether basic auth guards it.
//! The auth flag is read off [`AUTH_REQUIRED`] when the row is built.
//!
//! # Auth policy
//!
//! Basic auth, when enabled, guards the management endpoints only: list,
//! deploy, delete, update, status, scale, info, secrets, logs and register.
//! Proxy, invoke, health, namespaces, metrics, checkpoints and kill-all are
//! left open. That split is a deliberate simplification inherited from the
//! provider API and is kept as-is here rather than widened or narrowed.

use std::sync::Arc;

use http::{Method, StatusCode};

use crate::capability::{Capability, CapabilitySet};
use crate::error::Error;
use crate::handler::Handler;
use crate::method::Methods;
use crate::middleware::{BasicAuth, Deadline, HttpMetrics, Stack};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Constraint, RouteSpec, Router};

/// Path of the Prometheus exposition endpoint. Always bound, never guarded,
/// never instrumented.
pub const METRICS_PATH: &str = "/metrics";

const NOT_IMPLEMENTED: &str = "Feature not implemented in this version of OpenFaaS";

/// What the binder does when a capability's slot is empty.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Absent {
    /// Binding fails with [`Error::MissingCapability`].
    Fail,
    /// Nothing is bound; the path falls through to the router's 404.
    Skip,
    /// `GET` is bound to a fixed `501 Not Implemented`.
    NotImplemented,
}

/// One row of the binding table.
#[derive(Clone, Debug)]
pub struct Binding {
    pub capability: Capability,
    pub route: RouteSpec,
    pub absent: Absent,
    pub requires_auth: bool,
}

/// Capabilities guarded by basic auth when it is enabled.
pub const AUTH_REQUIRED: [Capability; 10] = [
    Capability::FunctionLister,
    Capability::DeployFunction,
    Capability::DeleteFunction,
    Capability::UpdateFunction,
    Capability::FunctionStatus,
    Capability::ScaleFunction,
    Capability::Info,
    Capability::Secrets,
    Capability::Logs,
    Capability::RegisterFunction,
];

fn row(capability: Capability, route: RouteSpec, absent: Absent) -> Binding {
    let requires_auth = AUTH_REQUIRED.contains(&capability);
    Binding { capability, route, absent, requires_auth }
}

fn named(template: &str, methods: Methods) -> RouteSpec {
    RouteSpec::new(template, methods).constrain("name", Constraint::Name)
}

/// The complete capability → route mapping.
pub fn table() -> Vec<Binding> {
    use Absent::*;
    use Capability::*;

    let get = || Methods::one(Method::GET);

    vec![
        row(FunctionLister, RouteSpec::new("/system/functions", get()), Fail),
        row(DeployFunction, RouteSpec::new("/system/functions", Methods::one(Method::POST)), Fail),
        row(DeleteFunction, RouteSpec::new("/system/functions", Methods::one(Method::DELETE)), Fail),
        row(UpdateFunction, RouteSpec::new("/system/functions", Methods::one(Method::PUT)), Fail),
        row(FunctionStatus, named("/system/function/{name}", get()), Fail),
        row(ScaleFunction, named("/system/scale-function/{name}", Methods::one(Method::POST)), Fail),
        row(Info, RouteSpec::new("/system/info", get()), Fail),
        row(
            Secrets,
            RouteSpec::new("/system/secrets", Methods::of(&[Method::GET, Method::PUT, Method::POST, Method::DELETE])),
            Fail,
        ),
        row(Logs, RouteSpec::new("/system/logs", get()), Fail),
        row(ListNamespaces, RouteSpec::new("/system/namespaces", get()), Fail),
        row(
            MutateNamespace,
            named("/system/namespace/{name}", Methods::of(&[Method::GET, Method::POST, Method::DELETE, Method::PUT]))
                .with_optional_tail(),
            NotImplemented,
        ),
        row(FunctionProxy, named("/function/{name}", Methods::Any).with_suffixes(), Fail),
        row(Health, RouteSpec::new("/healthz", get()), Skip),
        row(RegisterFunction, RouteSpec::new("/system/register", Methods::one(Method::POST)), Skip),
        row(InvokeFunction, named("/invoke/{name}", Methods::Any).with_suffixes(), Skip),
        row(MetricFunction, RouteSpec::new("/system/metrics", Methods::of(&[Method::GET, Method::DELETE])), Skip),
        row(ListCheckpoint, RouteSpec::new("/system/checkpoints", get()), Skip),
        row(
            KillAllInstance,
            RouteSpec::new("/danger/kill", Methods::of(&[Method::GET, Method::POST, Method::PUT])),
            Skip,
        ),
    ]
}

async fn not_implemented(_req: Request) -> Response {
    Response::builder().status(StatusCode::NOT_IMPLEMENTED).text(NOT_IMPLEMENTED)
}

/// Binds every capability in `capabilities` onto `router`, plus the
/// `/metrics` exposition endpoint.
///
/// Every bound handler is instrumented under its route template. When
/// `deadline` is given it sits directly inside the instrumentation, so a
/// handler cut off at the write deadline is still counted as a `503`. When
/// `auth` is given, rows flagged `requires_auth` are additionally guarded and
/// rejected requests are counted too. Each handler is decorated once and that
/// single decorated handler serves all of its path variants.
pub fn bind(
    router: &mut Router,
    capabilities: &CapabilitySet,
    metrics: &Arc<HttpMetrics>,
    deadline: Option<&Deadline>,
    auth: Option<&BasicAuth>,
) -> Result<(), Error> {
    let before = router.len();

    for binding in table() {
        let (route, handler, guarded) = match (capabilities.get(binding.capability), binding.absent) {
            (Some(handler), _) => (binding.route, Arc::clone(handler), binding.requires_auth),
            (None, Absent::Fail) => return Err(Error::MissingCapability(binding.capability)),
            (None, Absent::Skip) => {
                tracing::debug!(capability = %binding.capability, "capability absent, route not bound");
                continue;
            }
            (None, Absent::NotImplemented) => {
                let fallback = RouteSpec::new(binding.route.template(), Methods::one(Method::GET))
                    .constrain("name", Constraint::Name)
                    .with_optional_tail();
                (fallback, not_implemented.into_boxed_handler(), false)
            }
        };

        let mut stack = Stack::new().push(metrics.instrument(route.template()));
        if let Some(deadline) = deadline {
            stack = stack.push(*deadline);
        }
        if let (true, Some(auth)) = (guarded, auth) {
            stack = stack.push(auth.clone());
        }
        router.route_boxed(&route, stack.apply(handler))?;
    }

    router.route_boxed(&RouteSpec::new(METRICS_PATH, Methods::one(Method::GET)), metrics.exposition())?;

    tracing::info!(routes = router.len() - before, auth = auth.is_some(), "capability routes bound");
    Ok(())
}
