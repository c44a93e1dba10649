//! Stock handler for the `/healthz` capability.
//!
//! Providers with nothing better to report can bind this as
//! [`Capability::Health`](crate::Capability::Health):
//!
//! ```rust
//! use gantry::{Capability, CapabilitySet, health};
//!
//! let capabilities = CapabilitySet::new().with(Capability::Health, health::liveness);
//! ```
//!
//! Replace it with a custom handler if health depends on the backing
//! orchestrator being reachable.

use crate::{Request, Response};

/// Always `200 OK` with body `OK`. If the process can answer HTTP at all it
/// is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::text("OK")
}
