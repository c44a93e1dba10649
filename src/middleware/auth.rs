//! HTTP basic authentication.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};

use super::Decorator;
use crate::auth::Credentials;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

/// Rejects requests whose `Authorization: Basic …` header does not carry
/// the configured credentials. Accepted requests reach the wrapped handler
/// untouched.
#[derive(Clone, Debug)]
pub struct BasicAuth {
    credentials: Arc<Credentials>,
}

impl BasicAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials: Arc::new(credentials) }
    }
}

impl Decorator for BasicAuth {
    fn decorate(&self, inner: BoxedHandler) -> BoxedHandler {
        Arc::new(Guarded { credentials: Arc::clone(&self.credentials), inner })
    }
}

struct Guarded {
    credentials: Arc<Credentials>,
    inner: BoxedHandler,
}

impl ErasedHandler for Guarded {
    fn call(&self, req: Request) -> BoxFuture {
        let authorized = req
            .header(AUTHORIZATION.as_str())
            .and_then(parse_basic)
            .is_some_and(|(user, password)| self.credentials.matches(&user, &password));

        if authorized {
            return self.inner.call(req);
        }

        tracing::debug!(method = %req.method(), path = %req.path(), "rejected request without valid credentials");
        Box::pin(async { unauthorized() })
    }
}

fn unauthorized() -> Response {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(WWW_AUTHENTICATE, HeaderValue::from_static(r#"Basic realm="Restricted""#))
        .text("invalid credentials")
}

/// Splits `Basic <base64(user:password)>` into its parts. The scheme is
/// matched case-insensitively.
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/system/functions");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        Request::from_http(builder.body(Bytes::new()).unwrap())
    }

    fn counting_handler() -> (BoxedHandler, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let handler = move |_req: Request| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Response::text("listed")
            }
        };
        (handler.into_boxed_handler(), hits)
    }

    #[test]
    fn parses_basic_header() {
        assert_eq!(
            parse_basic(&basic("admin", "pa:ss")),
            Some(("admin".to_owned(), "pa:ss".to_owned()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic not-base64!"), None);
        assert!(parse_basic(&basic("a", "b").replace("Basic", "basic")).is_some());
    }

    #[tokio::test]
    async fn missing_or_wrong_credentials_short_circuit() {
        let (handler, hits) = counting_handler();
        let guarded = BasicAuth::new(Credentials::new("admin", "secret")).decorate(handler);

        for auth in [None, Some(basic("admin", "wrong")), Some(basic("root", "secret"))] {
            let res = guarded.call(request(auth.as_deref())).await;
            assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(res.headers()[WWW_AUTHENTICATE], r#"Basic realm="Restricted""#);
            assert_eq!(res.body().as_ref(), b"invalid credentials");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_credentials_pass_through() {
        let (handler, hits) = counting_handler();
        let guarded = BasicAuth::new(Credentials::new("admin", "secret")).decorate(handler);

        let res = guarded.call(request(Some(&basic("admin", "secret")))).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"listed");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
