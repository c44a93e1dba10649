//! Middleware layer.
//!
//! A [`Decorator`] takes a [`BoxedHandler`] and returns another one with the
//! same request/response contract. The gateway ships three:
//!
//! - [`BasicAuth`] rejects requests without valid credentials before the
//!   wrapped handler runs.
//! - [`Instrument`] records count, latency and in-flight requests per route
//!   template without touching the response.
//! - [`Deadline`] replaces a handler that overruns the write timeout with a
//!   `503`.
//!
//! Decorators are combined with a [`Stack`], listed outermost first:
//!
//! ```text
//! Stack::new().push(instrument).push(basic_auth).apply(handler)
//!     == instrument(basic_auth(handler))
//! ```

mod auth;
mod deadline;
mod metrics;

use std::sync::Arc;

use crate::handler::BoxedHandler;

pub use auth::BasicAuth;
pub use deadline::Deadline;
pub use metrics::{HttpMetrics, Instrument};

/// Wraps a handler in a cross-cutting behaviour.
pub trait Decorator: Send + Sync {
    fn decorate(&self, inner: BoxedHandler) -> BoxedHandler;
}

/// An ordered list of decorators, outermost first.
///
/// Concatenating stacks is associative: `a.then(b).then(c)` and
/// `a.then(b.then(c))` produce the same wrapping.
#[derive(Clone, Default)]
pub struct Stack {
    layers: Vec<Arc<dyn Decorator>>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `decorator` inside every decorator already in the stack.
    pub fn push(mut self, decorator: impl Decorator + 'static) -> Self {
        self.layers.push(Arc::new(decorator));
        self
    }

    /// Appends `inner`'s decorators inside this stack's.
    pub fn then(mut self, inner: Stack) -> Self {
        self.layers.extend(inner.layers);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wraps `handler` in every decorator, the first one outermost.
    pub fn apply(&self, handler: BoxedHandler) -> BoxedHandler {
        self.layers.iter().rev().fold(handler, |inner, layer| layer.decorate(inner))
    }
}

impl Decorator for Stack {
    fn decorate(&self, inner: BoxedHandler) -> BoxedHandler {
        self.apply(inner)
    }
}
