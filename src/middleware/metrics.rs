//! Request instrumentation and Prometheus exposition.
//!
//! Metrics are labelled by route *template* (`/function/{name}`), never by
//! the concrete path, so every path variant of a capability lands on the
//! same series and label cardinality stays bounded by the route table.
//!
//! # Metrics
//! - `http_requests_total{code,method,path}` (counter)
//! - `http_request_duration_seconds{code,method,path}` (histogram)
//! - `http_requests_in_flight{path}` (gauge)
//!
//! The `method` label is one of the nine standard methods; anything else is
//! recorded as `other`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use super::Decorator;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

/// Collectors for gateway HTTP traffic, registered in a registry owned by
/// this value so independent gateways never share series.
pub struct HttpMetrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    in_flight: IntGaugeVec,
}

impl HttpMetrics {
    pub fn new() -> Result<Self, Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["code", "method", "path"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "Seconds spent serving HTTP requests"),
            &["code", "method", "path"],
        )?;
        let in_flight = IntGaugeVec::new(
            Opts::new("http_requests_in_flight", "Number of HTTP requests currently being served"),
            &["path"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self { registry, requests, duration, in_flight })
    }

    /// A decorator that records requests under `template`.
    pub fn instrument(self: &Arc<Self>, template: impl Into<Arc<str>>) -> Instrument {
        Instrument { metrics: Arc::clone(self), template: template.into() }
    }

    /// Number of completed requests recorded for `template`, summed over
    /// methods and status codes.
    pub fn request_count(&self, template: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "http_requests_total")
            .flat_map(|family| family.get_metric())
            .filter(|m| m.get_label().iter().any(|l| l.get_name() == "path" && l.get_value() == template))
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    /// Requests currently inside a handler bound under `template`.
    pub fn in_flight(&self, template: &str) -> i64 {
        self.in_flight.with_label_values(&[template]).get()
    }

    /// Renders every collector in the Prometheus text format.
    pub fn render(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }

    /// Handler for the `/metrics` exposition endpoint.
    pub fn exposition(self: &Arc<Self>) -> BoxedHandler {
        Arc::new(Exposition(Arc::clone(self)))
    }

    fn enter(&self, template: &str) -> InFlight {
        let gauge = self.in_flight.with_label_values(&[template]);
        gauge.inc();
        InFlight(gauge)
    }

    fn observe(&self, template: &str, method: &str, code: StatusCode, elapsed: Duration) {
        let code = code.as_str();
        self.requests.with_label_values(&[code, method, template]).inc();
        self.duration
            .with_label_values(&[code, method, template])
            .observe(elapsed.as_secs_f64());
    }
}

const STANDARD_METHODS: [&str; 9] = ["GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH"];

/// Label value for `method`. Extension methods share one series.
fn method_label(method: &Method) -> &'static str {
    STANDARD_METHODS
        .iter()
        .copied()
        .find(|m| *m == method.as_str())
        .unwrap_or("other")
}

/// Decrements the in-flight gauge when the request finishes or is dropped.
struct InFlight(IntGauge);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Records count, latency and concurrency for one route template.
///
/// Obtain via [`HttpMetrics::instrument`]. The response is passed through
/// unchanged.
#[derive(Clone)]
pub struct Instrument {
    metrics: Arc<HttpMetrics>,
    template: Arc<str>,
}

impl Decorator for Instrument {
    fn decorate(&self, inner: BoxedHandler) -> BoxedHandler {
        Arc::new(Instrumented {
            metrics: Arc::clone(&self.metrics),
            template: Arc::clone(&self.template),
            inner,
        })
    }
}

struct Instrumented {
    metrics: Arc<HttpMetrics>,
    template: Arc<str>,
    inner: BoxedHandler,
}

impl ErasedHandler for Instrumented {
    fn call(&self, req: Request) -> BoxFuture {
        let metrics = Arc::clone(&self.metrics);
        let template = Arc::clone(&self.template);
        let method = method_label(req.method());
        let guard = metrics.enter(&template);
        let fut = self.inner.call(req);

        Box::pin(async move {
            let start = Instant::now();
            let res = fut.await;
            drop(guard);
            metrics.observe(&template, method, res.status_code(), start.elapsed());
            res
        })
    }
}

struct Exposition(Arc<HttpMetrics>);

impl ErasedHandler for Exposition {
    fn call(&self, _req: Request) -> BoxFuture {
        let rendered = self.0.render();
        Box::pin(async move {
            match rendered {
                Ok(body) => Response::builder().bytes(prometheus::TEXT_FORMAT, body),
                Err(e) => {
                    tracing::error!("metrics encoding failed: {e}");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}
