//! Basic-auth credentials and where they come from.
//!
//! The gateway does not own credential storage. It asks a
//! [`CredentialSource`] once at start-up and hands the resulting
//! [`Credentials`] to the [`BasicAuth`](crate::middleware::BasicAuth)
//! decorator. The stock source reads the two files a secret mount exposes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

const USER_FILE: &str = "basic-auth-user";
const PASSWORD_FILE: &str = "basic-auth-password";

/// A user / password pair checked by the basic-auth decorator.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), password: password.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn matches(&self, user: &str, password: &str) -> bool {
        self.user == user && self.password == password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Produces the credentials the gateway enforces.
pub trait CredentialSource {
    fn read(&self) -> Result<Credentials, Error>;
}

impl CredentialSource for Credentials {
    fn read(&self) -> Result<Credentials, Error> {
        Ok(self.clone())
    }
}

/// Reads `basic-auth-user` and `basic-auth-password` from a mounted secret
/// directory. Surrounding whitespace (the trailing newline most secret
/// tooling writes) is stripped.
#[derive(Clone, Debug)]
pub struct SecretMount {
    path: PathBuf,
}

impl SecretMount {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for SecretMount {
    fn read(&self) -> Result<Credentials, Error> {
        let user = read_secret(&self.path.join(USER_FILE))?;
        let password = read_secret(&self.path.join(PASSWORD_FILE))?;
        Ok(Credentials { user, password })
    }
}

fn read_secret(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_owned())
        .map_err(|source| Error::Credentials { path: path.to_owned(), source })
}
