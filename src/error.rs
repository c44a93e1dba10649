//! Unified error type.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::capability::Capability;

/// The error type returned by gantry's fallible operations.
///
/// Request-level failures (401, 404, 501, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// configuration and infrastructure failures: everything here is fatal for
/// the process that hits it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("invalid route `{pattern}`: {source}")]
    InvalidRoute {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("route `{method} {pattern}` is already registered")]
    RouteConflict { method: String, pattern: String },

    #[error("required capability `{0}` was not provided")]
    MissingCapability(Capability),

    #[error("unable to read basic-auth credentials from {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("server shutdown failed: connections still open after {0:?}")]
    ShutdownTimeout(Duration),

    #[error("serve task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("config: {0}")]
    Config(String),
}
