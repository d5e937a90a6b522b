//! Backend abstraction for the hypervisor control plane.
//!
//! The [`Hypervisor`] trait is the remote API the orchestrator drives. It is
//! implemented by:
//! - [`govc::GovcBackend`] for vSphere/ESXi hosts via the `govc` CLI
//! - [`memory::MemoryBackend`] for simulated labs and tests
//!
//! A [`Connector`] opens sessions: either a fresh connection to an explicit
//! host, or the ambient one already configured for this process.

pub mod govc;
pub mod memory;

use crate::error::Result;
use crate::types::{Credential, PowerState, Snapshot, ToolsStatus, Vm};

/// Operations consumed from the hypervisor control plane.
///
/// Implementations must be shareable across worker threads; a session's
/// backend is never mutated by the orchestrator after acquisition.
pub trait Hypervisor: Send + Sync {
    /// Full inventory, in the order the host returns it.
    fn list_vms(&self) -> Result<Vec<Vm>>;

    /// Look up a VM by name. Returns [`Error::NotFound`](crate::Error::NotFound)
    /// when absent.
    fn get_vm(&self, name: &str) -> Result<Vm>;

    /// Current power state.
    fn power_state(&self, vm: &Vm) -> Result<PowerState>;

    /// Current guest-tools status.
    fn tools_status(&self, vm: &Vm) -> Result<ToolsStatus>;

    /// Power on (or resume from suspend).
    fn start(&self, vm: &Vm) -> Result<()>;

    /// Forced power-off, bypassing the guest OS.
    fn hard_stop(&self, vm: &Vm) -> Result<()>;

    /// Ask the guest OS to shut down via tools.
    fn guest_shutdown(&self, vm: &Vm) -> Result<()>;

    /// Ask the guest OS to restart via tools.
    fn guest_restart(&self, vm: &Vm) -> Result<()>;

    /// Suspend to disk.
    fn suspend(&self, vm: &Vm) -> Result<()>;

    /// All snapshots of the VM, in no particular order.
    fn list_snapshots(&self, vm: &Vm) -> Result<Vec<Snapshot>>;

    /// Create a snapshot under the given name.
    fn create_snapshot(&self, vm: &Vm, name: &str) -> Result<()>;

    /// Delete a snapshot.
    fn delete_snapshot(&self, vm: &Vm, snapshot: &Snapshot) -> Result<()>;

    /// Set the VM's state to the snapshot.
    fn revert_to_snapshot(&self, vm: &Vm, snapshot: &Snapshot) -> Result<()>;

    /// Close the connection. Only called for sessions this run created.
    fn disconnect(&self) -> Result<()>;
}

/// Opens control-plane sessions.
pub trait Connector {
    /// Connect to an explicit host with credentials.
    fn connect(&self, host: &str, credential: &Credential) -> Result<Box<dyn Hypervisor>>;

    /// The session already configured for this process, if any.
    fn ambient(&self) -> Result<Option<Box<dyn Hypervisor>>>;
}
