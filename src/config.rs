//! Client configuration and authentication material.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::{load_openssh_certificate, load_secret_key, Certificate, PrivateKey, PublicKey};

use crate::error::Result;
use crate::known_hosts;
use crate::scp::DEFAULT_TIMEOUT;

/// Connection settings for a [`Client`](crate::Client).
///
/// Built through one of the constructors, which load and validate the
/// authentication material up front. With `check_host_key` the server's key
/// is resolved from `$HOME/.ssh/known_hosts` at construction time and pinned
/// for the connection; without it any presented key is accepted.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub(crate) auth: AuthMethod,
    pub(crate) host_key: HostKeyPolicy,
    pub(crate) timeout: Duration,
}

#[derive(Clone)]
pub(crate) enum AuthMethod {
    Password(String),
    Key(Arc<PrivateKey>),
    Certificate {
        key: Arc<PrivateKey>,
        cert: Certificate,
    },
}

#[derive(Clone)]
pub(crate) enum HostKeyPolicy {
    /// Compare against the pinned key from the known-hosts store.
    Fixed(PublicKey),
    /// Accept whatever the server presents.
    AcceptAny,
}

impl Config {
    /// Password authentication.
    pub fn with_password(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        check_host_key: bool,
    ) -> Result<Self> {
        let host = host.into();
        Ok(Self {
            host_key: host_key_policy(&host, port, check_host_key)?,
            host,
            port,
            user: user.into(),
            auth: AuthMethod::Password(password.into()),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Private key authentication; the key file is loaded and parsed here.
    pub fn with_key_file(
        user: impl Into<String>,
        key_path: impl AsRef<Path>,
        host: impl Into<String>,
        port: u16,
        check_host_key: bool,
    ) -> Result<Self> {
        let key = load_secret_key(key_path, None)?;
        let host = host.into();
        Ok(Self {
            host_key: host_key_policy(&host, port, check_host_key)?,
            host,
            port,
            user: user.into(),
            auth: AuthMethod::Key(Arc::new(key)),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Private key plus a signed public key (OpenSSH certificate).
    pub fn with_signed_key_file(
        user: impl Into<String>,
        key_path: impl AsRef<Path>,
        cert_path: impl AsRef<Path>,
        host: impl Into<String>,
        port: u16,
        check_host_key: bool,
    ) -> Result<Self> {
        let key = load_secret_key(key_path, None)?;
        let cert = load_openssh_certificate(cert_path)?;
        let host = host.into();
        Ok(Self {
            host_key: host_key_policy(&host, port, check_host_key)?,
            host,
            port,
            user: user.into(),
            auth: AuthMethod::Certificate {
                key: Arc::new(key),
                cert,
            },
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-transfer wall-clock timeout (default 15 minutes).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn host_key_policy(host: &str, port: u16, check_host_key: bool) -> Result<HostKeyPolicy> {
    if check_host_key {
        Ok(HostKeyPolicy::Fixed(known_hosts::lookup(host, port)?))
    } else {
        Ok(HostKeyPolicy::AcceptAny)
    }
}
