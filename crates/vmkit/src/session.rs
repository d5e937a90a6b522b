//! Scoped control-plane session.
//!
//! A session is acquired once per batch and shared read-only by every VM
//! operation. Ownership decides release:
//! 1. An explicit host means this run connected, so it must disconnect
//! 2. Without a host the ambient session is reused and left alone
//! 3. Without either the batch cannot start
//!
//! Release happens through [`Session::release`] or, failing that, on drop.

use crate::backend::{Connector, Hypervisor};
use crate::error::{Error, Result};
use crate::types::Credential;
use std::fmt;

/// Supplies credentials for an explicit host, typically by prompting.
pub trait CredentialProvider {
    /// Credentials for `host`. `username` is pre-filled when the caller knows it.
    fn credential(&self, host: &str, username: Option<&str>) -> Result<Credential>;
}

/// Provider returning fixed credentials (non-interactive use, tests).
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credential);

impl CredentialProvider for StaticCredentials {
    fn credential(&self, _host: &str, username: Option<&str>) -> Result<Credential> {
        let mut credential = self.0.clone();
        if let Some(user) = username {
            credential.username = user.to_string();
        }
        Ok(credential)
    }
}

/// Live connection to the hypervisor control plane.
pub struct Session {
    client: Box<dyn Hypervisor>,
    host: Option<String>,
    created_by_this_run: bool,
    released: bool,
}

impl Session {
    /// Open or reuse a session.
    ///
    /// With `explicit_host`, credentials come from `credentials` and a new
    /// connection is made. Otherwise the connector's ambient session is
    /// reused; if there is none this fails with [`Error::NoSession`].
    pub fn acquire(
        connector: &dyn Connector,
        explicit_host: Option<&str>,
        username: Option<&str>,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self> {
        if let Some(host) = explicit_host {
            let credential = credentials.credential(host, username)?;
            let client = connector.connect(host, &credential)?;
            log::info!("opened session to {host}");
            return Ok(Self {
                client,
                host: Some(host.to_string()),
                created_by_this_run: true,
                released: false,
            });
        }

        match connector.ambient()? {
            Some(client) => {
                log::info!("reusing ambient session");
                Ok(Self {
                    client,
                    host: None,
                    created_by_this_run: false,
                    released: false,
                })
            }
            None => Err(Error::NoSession),
        }
    }

    /// The backend shared by all VM operations.
    pub fn hypervisor(&self) -> &dyn Hypervisor {
        self.client.as_ref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Whether this run opened the session (and therefore closes it).
    pub fn created_by_this_run(&self) -> bool {
        self.created_by_this_run
    }

    /// Disconnect if this run created the session; otherwise a no-op.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if !self.created_by_this_run {
            log::debug!("leaving ambient session open");
            return Ok(());
        }
        log::info!(
            "closing session to {}",
            self.host.as_deref().unwrap_or("host")
        );
        self.client.disconnect()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("created_by_this_run", &self.created_by_this_run)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            log::warn!("failed to close session: {e}");
        }
    }
}
