//! # gantry
//!
//! The routing and lifecycle layer of a function-serving gateway.
//!
//! A provider supplies handlers for the capabilities it implements (list,
//! deploy, scale, proxy, invoke, …). gantry binds them onto the fixed gateway
//! HTTP surface, wraps them with basic auth and Prometheus instrumentation
//! where the policy says so, serves them, and shuts down gracefully on
//! SIGINT / SIGTERM.
//!
//! What gantry does not do: execute functions, store credentials, or decide
//! anything about namespaces. Those are the handlers' business.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gantry::{Capability, CapabilitySet, Request, Response, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let capabilities = CapabilitySet::new()
//!         .with(Capability::FunctionLister, list)
//!         .with(Capability::FunctionProxy, proxy);
//!         // … every always-bound capability, plus any optional ones
//!
//!     gantry::serve(capabilities, ServerConfig::default()).await;
//! }
//!
//! async fn list(_req: Request) -> Response {
//!     Response::json(b"[]".to_vec())
//! }
//!
//! async fn proxy(req: Request) -> Response {
//!     let name = req.param("name").unwrap_or_default();
//!     Response::text(format!("would call {name}"))
//! }
//! ```

mod auth;
mod capability;
mod config;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod binder;
pub mod health;
pub mod middleware;

pub use auth::{CredentialSource, Credentials, SecretMount};
pub use capability::{Capability, CapabilitySet};
pub use config::{DEFAULT_MAX_HEADER_BYTES, DEFAULT_PORT, ServerConfig};
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use method::Methods;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Constraint, RouteEntry, RouteSpec, Router, is_valid_name};
pub use server::{Gateway, Running, SHUTDOWN_TIMEOUT, State, shutdown_signal};

/// Binds `capabilities`, serves until SIGINT or SIGTERM, then drains.
///
/// Any fatal error (unreadable credentials, a bad route table, a failed
/// bind, a missed drain deadline) is logged and the process exits with
/// status 1.
pub async fn serve(capabilities: CapabilitySet, config: ServerConfig) {
    let result = match Gateway::new(config, capabilities) {
        Ok(gateway) => gateway.serve().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!("gantry: {e}");
        std::process::exit(1);
    }
}
