//! Server configuration.
//!
//! Loading is normally done by the provider's own CLI; gantry only consumes
//! the resulting [`ServerConfig`]. For convenience the struct deserializes
//! from TOML with every field defaulted:
//!
//! ```toml
//! read_timeout = 10          # seconds, 0 disables
//! write_timeout = 10         # seconds, 0 disables
//! tcp_port = 8081            # optional, defaults to 8080
//! enable_basic_auth = true
//! secret_mount_path = "/var/openfaas/secrets"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::Error;

pub const DEFAULT_PORT: u16 = 8080;

/// 1 MiB, the customary ceiling on request header size.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1 << 20;

/// Smallest header buffer the HTTP/1 connection layer accepts.
const MIN_MAX_HEADER_BYTES: usize = 8192;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Time allowed to read a request's headers and body. Zero disables.
    #[serde(deserialize_with = "seconds")]
    pub read_timeout: Duration,

    /// Time allowed for the handler to produce a response. Zero disables.
    #[serde(deserialize_with = "seconds")]
    pub write_timeout: Duration,

    /// Listen port; [`DEFAULT_PORT`] when unset. `Some(0)` picks an
    /// ephemeral port.
    pub tcp_port: Option<u16>,

    /// Guard management endpoints with HTTP basic auth.
    pub enable_basic_auth: bool,

    /// Directory holding `basic-auth-user` and `basic-auth-password`.
    pub secret_mount_path: PathBuf,

    /// Upper bound on request header bytes per connection.
    pub max_header_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            tcp_port: None,
            enable_basic_auth: false,
            secret_mount_path: PathBuf::from("/var/openfaas/secrets"),
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.tcp_port.unwrap_or(DEFAULT_PORT)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_header_bytes < MIN_MAX_HEADER_BYTES {
            return Err(Error::Config(format!(
                "max_header_bytes must be at least {MIN_MAX_HEADER_BYTES}, got {}",
                self.max_header_bytes
            )));
        }
        Ok(())
    }
}

fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(d)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
