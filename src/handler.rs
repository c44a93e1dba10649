//! Handler trait and type erasure.
//!
//! # How capability handlers are stored
//!
//! The router holds handlers of *different* concrete types — a function
//! lister, a proxy, a decorated deploy handler — behind one uniform type so
//! they can live in the same radix trees and be passed through decorators.
//! That type is [`BoxedHandler`], a shared trait object:
//!
//! ```text
//! async fn list(req: Request) -> Response { … }      ← collaborator writes this
//!        ↓ CapabilitySet::new().with(Capability::FunctionLister, list)
//! list.into_boxed_handler()                          ← Handler blanket impl
//!        ↓  Arc<dyn ErasedHandler>
//! BasicAuth / Instrument decorators                  ← wrap, still a BoxedHandler
//!        ↓
//! handler.call(req) at request time                  ← one vtable dispatch per layer
//! ```
//!
//! Because every decorator consumes and produces a [`BoxedHandler`], a
//! decorated handler has exactly the same contract as the one it wraps.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe dispatch interface behind [`BoxedHandler`].
///
/// Decorators in [`middleware`](crate::middleware) implement this directly;
/// application code normally goes through the [`Handler`] blanket impl.
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests and across every
/// path variant bound to the same capability.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid capability handler.
///
/// Automatically satisfied for any function or closure with the shape
///
/// ```text
/// Fn(Request) -> impl Future<Output = impl IntoResponse>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
