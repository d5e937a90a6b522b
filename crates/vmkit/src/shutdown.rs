//! Guest-tools-aware graceful shutdown with bounded polling.
//!
//! Tools `Ok` gets a guest shutdown request. Tools not installed can never
//! confirm a graceful shutdown, so the VM is powered off immediately. Tools
//! not ready are polled at a fixed delay for at most
//! [`ShutdownPolicy::max_attempts`] re-queries before falling back to a hard
//! stop.

use crate::backend::Hypervisor;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::types::{ShutdownPolicy, ToolsStatus, Vm};
use std::fmt;

/// Why a VM was hard-stopped instead of shut down through the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardStopReason {
    /// Guest tools are not installed
    ToolsNotInstalled,
    /// Tools never became ready within the poll budget
    ToolsNotReady { attempts: u32 },
}

/// How a shutdown completed. Failures are reported as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Guest OS was asked to shut down
    GracefulShutdown,
    /// Forced power-off
    HardStopped(HardStopReason),
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GracefulShutdown => write!(f, "guest shutdown requested"),
            Self::HardStopped(HardStopReason::ToolsNotInstalled) => {
                write!(f, "powered off (guest tools not installed)")
            }
            Self::HardStopped(HardStopReason::ToolsNotReady { attempts }) => write!(
                f,
                "powered off (guest tools not ready after {attempts} attempts)"
            ),
        }
    }
}

/// Shut a VM down, gracefully when the guest allows it.
///
/// Blocks the calling thread for at most `policy.max_wait()` while polling.
/// Cancelling `cancel` aborts the poll with [`Error::Cancelled`] and issues no
/// power operation.
pub fn shutdown(
    hypervisor: &dyn Hypervisor,
    vm: &Vm,
    policy: &ShutdownPolicy,
    cancel: &CancelToken,
) -> Result<ShutdownOutcome> {
    let mut status = hypervisor.tools_status(vm)?;
    let mut attempts = 0;
    if status == ToolsStatus::NotReady {
        log::debug!(
            "{vm}: tools not ready, polling for up to {}s",
            policy.max_wait().as_secs()
        );
    }

    while status == ToolsStatus::NotReady && attempts < policy.max_attempts {
        if cancel.wait(policy.poll_delay) {
            log::info!("{vm}: shutdown poll cancelled after {attempts} attempts");
            return Err(Error::Cancelled);
        }
        attempts += 1;
        status = hypervisor.tools_status(vm)?;
        log::debug!(
            "{vm}: tools {status} (attempt {attempts}/{})",
            policy.max_attempts
        );
    }

    match status {
        ToolsStatus::Ok => {
            hypervisor.guest_shutdown(vm)?;
            log::info!("{vm}: guest shutdown requested");
            Ok(ShutdownOutcome::GracefulShutdown)
        }
        ToolsStatus::NotInstalled => {
            log::warn!("{vm}: guest tools not installed, forcing power off");
            hypervisor.hard_stop(vm)?;
            Ok(ShutdownOutcome::HardStopped(HardStopReason::ToolsNotInstalled))
        }
        ToolsStatus::NotReady => {
            log::warn!("{vm}: guest tools not ready after {attempts} attempts, forcing power off");
            hypervisor.hard_stop(vm)?;
            Ok(ShutdownOutcome::HardStopped(HardStopReason::ToolsNotReady {
                attempts,
            }))
        }
    }
}
