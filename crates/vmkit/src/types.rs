//! Core types for VM lifecycle management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Power state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    /// Running
    PoweredOn,
    /// Stopped
    PoweredOff,
    /// Memory saved to disk, not running
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoweredOn => write!(f, "powered on"),
            Self::PoweredOff => write!(f, "powered off"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Status of the in-guest tools agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolsStatus {
    /// Tools running and able to accept guest operations
    Ok,
    /// Tools are not installed in the guest
    NotInstalled,
    /// Tools installed but not (yet) running
    NotReady,
}

impl fmt::Display for ToolsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NotInstalled => write!(f, "not installed"),
            Self::NotReady => write!(f, "not ready"),
        }
    }
}

/// A fresh reading of a VM's state. Never cached between decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmState {
    pub power: PowerState,
    pub tools: ToolsStatus,
}

/// A virtual machine in the host inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vm {
    /// Name, unique within the inventory
    pub name: String,
    /// Full inventory path when the backend knows it
    pub path: Option<String>,
}

impl Vm {
    /// Create a VM reference from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    /// Attach an inventory path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A point-in-time snapshot of a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name (`MM-DD-YYYY-HH-mm` when created by this tool)
    pub name: String,
    /// Creation time as reported by the host
    pub created: DateTime<Utc>,
    /// Owning VM name
    pub vm: String,
    /// Backend-specific identifier (e.g. managed object reference)
    pub id: Option<String>,
}

/// Username/password handed to a backend when opening a session.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bounds for the graceful shutdown poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Wait between tools-status polls
    pub poll_delay: Duration,
    /// Maximum number of re-queries before falling back to a hard stop
    pub max_attempts: u32,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl ShutdownPolicy {
    /// Create a policy with custom settings.
    pub fn new(poll_delay: Duration, max_attempts: u32) -> Self {
        Self {
            poll_delay,
            max_attempts,
        }
    }

    /// Longest time a single VM can spend polling (saturates at `Duration::MAX`).
    pub fn max_wait(&self) -> Duration {
        self.poll_delay.saturating_mul(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_policy_defaults() {
        let policy = ShutdownPolicy::default();
        assert_eq!(policy.poll_delay, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.max_wait(), Duration::from_secs(15));
    }

    #[test]
    fn test_max_wait_saturates() {
        let policy = ShutdownPolicy::new(Duration::from_secs(u64::MAX), 3);
        assert_eq!(policy.max_wait(), Duration::MAX);
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let credential = Credential::new("root", "hunter2");
        let debug = format!("{credential:?}");
        assert!(debug.contains("root"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_vm_display_uses_name() {
        let vm = Vm::new("web01").with_path("/dc1/vm/web01");
        assert_eq!(vm.to_string(), "web01");
        assert_eq!(vm.path.as_deref(), Some("/dc1/vm/web01"));
    }
}
