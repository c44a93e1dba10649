//! Write deadline for handlers.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use super::Decorator;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

const EXCEEDED: &str = "handler exceeded write timeout";

/// Answers `503 Service Unavailable` when the wrapped handler has not
/// produced a response within `limit`. The handler future is dropped at
/// that point.
///
/// A zero limit disables the deadline and [`Decorator::decorate`] returns
/// the handler unchanged.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl Decorator for Deadline {
    fn decorate(&self, inner: BoxedHandler) -> BoxedHandler {
        if self.limit.is_zero() {
            return inner;
        }
        Arc::new(Bounded { limit: self.limit, inner })
    }
}

struct Bounded {
    limit: Duration,
    inner: BoxedHandler,
}

impl ErasedHandler for Bounded {
    fn call(&self, req: Request) -> BoxFuture {
        let limit = self.limit;
        let path = req.path().to_owned();
        let fut = self.inner.call(req);

        Box::pin(async move {
            match tokio::time::timeout(limit, fut).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::warn!(path = %path, deadline = ?limit, "handler exceeded write timeout");
                    Response::builder().status(StatusCode::SERVICE_UNAVAILABLE).text(EXCEEDED)
                }
            }
        })
    }
}
