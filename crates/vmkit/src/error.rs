//! Error types for VM lifecycle operations.
//!
//! Errors are categorized so the batch executor can report a stable kind per
//! VM and the CLI can give appropriate feedback. Only [`Error::NoSession`] is
//! fatal for a batch; everything else is scoped to the VM it happened on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Categories of errors, reported alongside per-VM failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No control-plane session available and none requested
    NoSession,
    /// VM (or other inventory object) does not exist
    NotFound,
    /// Revert requested but the VM has no snapshot
    NoSnapshot,
    /// Connectivity problem talking to the host
    Network,
    /// Credentials rejected by the host
    Authentication,
    /// The host refused the operation in the VM's current state
    InvalidState,
    /// Operation interrupted by cancellation or timeout
    Cancelled,
    /// A backend command failed for another reason
    Operation,
}

impl ErrorKind {
    /// Whether this kind aborts a whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoSession)
    }

    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoSession => "no session",
            Self::NotFound => "not found",
            Self::NoSnapshot => "no snapshot",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::InvalidState => "invalid state",
            Self::Cancelled => "cancelled",
            Self::Operation => "operation failed",
        }
    }

    /// Actionable advice for resolving this error kind.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NoSession => "Pass --host to open a session, or export GOVC_URL",
            Self::NotFound => "Check the VM name against the host inventory",
            Self::NoSnapshot => "Take a snapshot first with the `snapshot` action",
            Self::Network => "Check connectivity to the host and try again",
            Self::Authentication => "Verify the username and password",
            Self::InvalidState => "Query the VM state and retry with a suitable action",
            Self::Cancelled => "Re-run the batch for the skipped machines",
            Self::Operation => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can occur while orchestrating VMs.
#[derive(Debug, Error)]
pub enum Error {
    /// No connection available and no host given
    #[error("no active session: pass a host to connect or set up an ambient session")]
    NoSession,

    /// VM not present in the inventory
    #[error("virtual machine not found: {name}")]
    NotFound {
        /// Name that could not be resolved
        name: String,
    },

    /// Revert requested on a VM without snapshots
    #[error("no snapshot exists for {vm}")]
    NoSnapshot {
        /// VM the revert was requested for
        vm: String,
    },

    /// Connectivity error (connection refused, DNS, timeout)
    #[error("network error: {message}")]
    Network {
        /// Details from the failed call
        message: String,
    },

    /// Login rejected
    #[error("authentication failed: {message}")]
    Authentication {
        /// Details from the failed login
        message: String,
    },

    /// The host refused the operation in the current power state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Details from the host
        message: String,
    },

    /// Interrupted by cancellation or timeout
    #[error("operation cancelled")]
    Cancelled,

    /// Backend command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Which command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error kind for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoSession => ErrorKind::NoSession,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::NoSnapshot { .. } => ErrorKind::NoSnapshot,
            Error::Network { .. } => ErrorKind::Network,
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Operation,
        }
    }

    /// Whether this error aborts a whole batch.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Create an error from `govc` stderr.
    ///
    /// Analyzes the message to categorize the failure.
    pub fn from_govc_output(stderr: &str, subject: Option<&str>) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("not found") || lower.contains("no such vm") {
            return Error::NotFound {
                name: subject.unwrap_or("unknown").to_string(),
            };
        }

        if lower.contains("incorrect user name or password")
            || lower.contains("cannot complete login")
            || lower.contains("notauthenticated")
            || lower.contains("invalidlogin")
        {
            return Error::Authentication {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("connection refused")
            || lower.contains("no such host")
            || lower.contains("i/o timeout")
            || lower.contains("timed out")
            || lower.contains("network is unreachable")
            || lower.contains("x509")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("invalidpowerstate")
            || lower.contains("invalid power state")
            || lower.contains("cannot be performed in the current state")
            || lower.contains("toolsunavailable")
        {
            return Error::InvalidState {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "govc command failed{}",
                subject.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, Error>;
