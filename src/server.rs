//! Gateway lifecycle and graceful shutdown.
//!
//! ```text
//! Idle ──new()──▶ Starting ──start()──▶ Serving ──signal──▶ Draining ──▶ Stopped
//! ```
//!
//! [`Gateway::new`] loads credentials and binds every capability route.
//! [`Gateway::start`] binds the listener and moves the accept loop onto a
//! background task, handing back a [`Running`] handle. The caller then blocks
//! on whatever should end the process (an OS signal in production, anything
//! at all in tests) and calls [`Running::shutdown`].
//!
//! On shutdown the server:
//! 1. Stops `listener.accept()` and closes the listening socket, so no new
//!    connections are made.
//! 2. Tells every open connection to finish its current request and close.
//! 3. Waits up to the drain deadline (10 s by default) for that to happen.
//!    Connections still open after the deadline are aborted and shutdown
//!    reports [`Error::ShutdownTimeout`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::auth::{CredentialSource, SecretMount};
use crate::binder;
use crate::capability::CapabilitySet;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::middleware::{BasicAuth, Deadline, HttpMetrics};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a gateway is in its life.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    Starting,
    Serving,
    Draining,
    Stopped,
}

/// A gateway whose routes are bound but which is not yet listening.
pub struct Gateway {
    config: ServerConfig,
    router: Router,
    metrics: Arc<HttpMetrics>,
    deadline: Deadline,
    shutdown_timeout: Duration,
    state: watch::Sender<State>,
}

impl Gateway {
    /// Binds `capabilities` per the gateway route table. When basic auth is
    /// enabled, credentials are read from `config.secret_mount_path`.
    pub fn new(config: ServerConfig, capabilities: CapabilitySet) -> Result<Self, Error> {
        let source = SecretMount::new(&config.secret_mount_path);
        Self::with_credentials(config, capabilities, &source)
    }

    /// Like [`Gateway::new`] but reads credentials from `source`.
    pub fn with_credentials(
        config: ServerConfig,
        capabilities: CapabilitySet,
        source: &impl CredentialSource,
    ) -> Result<Self, Error> {
        config.validate()?;
        let (state, _) = watch::channel(State::Idle);

        let auth = match config.enable_basic_auth {
            true => Some(BasicAuth::new(source.read()?)),
            false => None,
        };

        let metrics = Arc::new(HttpMetrics::new()?);
        let mut router = Router::new();
        let deadline = Deadline::new(config.write_timeout);
        binder::bind(&mut router, &capabilities, &metrics, Some(&deadline), auth.as_ref())?;

        state.send_replace(State::Starting);
        Ok(Self {
            config,
            router,
            metrics,
            deadline,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            state,
        })
    }

    /// Access to the router for adding routes before the gateway starts.
    ///
    /// Routes added here are served as given. Wrap their handlers with
    /// [`Gateway::deadline`] (and [`HttpMetrics::instrument`]) to hold them
    /// to the same write timeout and metrics as the capability routes.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<HttpMetrics> {
        &self.metrics
    }

    /// The write deadline applied to every capability route.
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Overrides the drain deadline (default [`SHUTDOWN_TIMEOUT`]).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Binds the listener and starts serving on a background task.
    pub async fn start(self) -> Result<Running, Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port()));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let mut conn = ConnBuilder::new(TokioExecutor::new());
        conn.http1().max_buf_size(self.config.max_header_bytes);
        if !self.config.read_timeout.is_zero() {
            conn.http1()
                .timer(TokioTimer::new())
                .header_read_timeout(self.config.read_timeout);
        }
        conn.http2()
            .max_header_list_size(u32::try_from(self.config.max_header_bytes).unwrap_or(u32::MAX));

        let read_timeout = self.config.read_timeout;
        let (trigger, signal) = watch::channel(false);
        let accept = AcceptLoop {
            listener,
            conn,
            router: Arc::new(self.router),
            read_timeout,
            drain_timeout: self.shutdown_timeout,
            state: self.state.clone(),
        };

        info!(addr = %local_addr, "gantry listening");
        self.state.send_replace(State::Serving);
        let task = tokio::spawn(accept.run(signal));

        Ok(Running {
            addr: local_addr,
            trigger,
            state: self.state,
            task,
        })
    }

    /// Starts serving and blocks until SIGINT or SIGTERM, then shuts down.
    pub async fn serve(self) -> Result<(), Error> {
        self.serve_until(shutdown_signal()).await
    }

    /// Starts serving and blocks until `signal` resolves, then shuts down.
    pub async fn serve_until<F>(self, signal: F) -> Result<(), Error>
    where
        F: Future<Output = Result<(), Error>>,
    {
        let running = self.start().await?;
        signal.await?;
        running.shutdown().await
    }
}

/// Handle to a serving gateway.
///
/// Dropping it without calling [`Running::shutdown`] also begins a graceful
/// shutdown, but nobody observes the outcome.
pub struct Running {
    addr: SocketAddr,
    trigger: watch::Sender<bool>,
    state: watch::Sender<State>,
    task: JoinHandle<Result<(), Error>>,
}

impl Running {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions from elsewhere.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Stops accepting, drains in-flight requests and waits for the serve
    /// task to finish.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.trigger.send_replace(true);
        self.task.await?
    }
}

struct AcceptLoop {
    listener: TcpListener,
    conn: ConnBuilder<TokioExecutor>,
    router: Arc<Router>,
    read_timeout: Duration,
    drain_timeout: Duration,
    state: watch::Sender<State>,
}

impl AcceptLoop {
    async fn run(self, mut signal: watch::Receiver<bool>) -> Result<(), Error> {
        let Self { listener, conn, router, read_timeout, drain_timeout, state } = self;
        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // Shutdown first so a trigger stops accepting even if more
                // connections are queued.
                biased;

                _ = signal.changed() => {
                    info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let svc = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        async move { dispatch(router, req, read_timeout).await }
                    });
                    let connection = graceful.watch(conn.serve_connection(TokioIo::new(stream), svc).into_owned());

                    tasks.spawn(async move {
                        if let Err(e) = connection.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        state.send_replace(State::Draining);

        let drained = tokio::time::timeout(drain_timeout, async {
            graceful.shutdown().await;
            while tasks.join_next().await.is_some() {}
        })
        .await;

        let result = match drained {
            Ok(()) => {
                info!("gantry stopped");
                Ok(())
            }
            Err(_) => {
                warn!(open = tasks.len(), deadline = ?drain_timeout, "drain deadline exceeded, aborting connections");
                tasks.shutdown().await;
                Err(Error::ShutdownTimeout(drain_timeout))
            }
        };
        state.send_replace(State::Stopped);
        result
    }
}

/// Runs `fut` under `limit`; a zero limit means no limit.
async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> Option<T> {
    if limit.is_zero() {
        return Some(fut.await);
    }
    tokio::time::timeout(limit, fut).await.ok()
}

/// Reads one request body and hands the request to the router.
///
/// The write deadline is not enforced here: it is a decorator on each bound
/// handler so that the instrumentation still sees the `503`.
///
/// The error type is [`Infallible`]: every failure becomes a response.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    read_timeout: Duration,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match within(read_timeout, body.collect()).await {
        Some(Ok(collected)) => collected.to_bytes(),
        Some(Err(e)) => {
            warn!(path = %parts.uri.path(), "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
        None => return Ok(Response::status(StatusCode::REQUEST_TIMEOUT).into_inner()),
    };

    let request = Request::from_http(http::Request::from_parts(parts, body));
    Ok(router.dispatch(request).await.into_inner())
}

/// Resolves on the first SIGINT or SIGTERM the process receives. On
/// non-Unix platforms only Ctrl-C is available.
pub async fn shutdown_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).map_err(Error::Signal)?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map_err(Error::Signal)?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.map_err(Error::Signal)?;

    info!("shutdown signal received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::auth::Credentials;

    async fn ok(_req: crate::Request) -> Response {
        Response::text("ok")
    }

    fn capabilities() -> CapabilitySet {
        [
            Capability::FunctionLister,
            Capability::DeployFunction,
            Capability::DeleteFunction,
            Capability::UpdateFunction,
            Capability::FunctionStatus,
            Capability::ScaleFunction,
            Capability::Info,
            Capability::Secrets,
            Capability::Logs,
            Capability::ListNamespaces,
            Capability::FunctionProxy,
        ]
        .into_iter()
        .fold(CapabilitySet::new(), |set, cap| set.with(cap, ok))
    }

    #[test]
    fn new_gateway_is_starting() {
        let gateway = Gateway::new(ServerConfig::default(), capabilities()).unwrap();
        assert_eq!(gateway.state(), State::Starting);
        assert!(gateway.router().routes().any(|e| e.pattern == "/metrics"));
    }

    #[test]
    fn unreadable_secret_mount_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            enable_basic_auth: true,
            secret_mount_path: dir.path().join("missing"),
            ..ServerConfig::default()
        };
        assert!(matches!(Gateway::new(config, capabilities()), Err(Error::Credentials { .. })));
    }

    #[test]
    fn credentials_are_ignored_when_auth_is_off() {
        let config = ServerConfig {
            secret_mount_path: "/nonexistent".into(),
            ..ServerConfig::default()
        };
        assert!(Gateway::new(config, capabilities()).is_ok());
        let with_source = Gateway::with_credentials(
            ServerConfig { enable_basic_auth: true, ..ServerConfig::default() },
            capabilities(),
            &Credentials::new("a", "b"),
        );
        assert!(with_source.is_ok());
    }

    #[tokio::test]
    async fn zero_limit_never_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            7
        };
        assert_eq!(within(Duration::ZERO, slow).await, Some(7));
        let slower = tokio::time::sleep(Duration::from_secs(5));
        assert_eq!(within(Duration::from_millis(10), slower).await, None);
    }
}
