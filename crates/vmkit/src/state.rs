//! Fresh VM state reads.

use crate::backend::Hypervisor;
use crate::error::Result;
use crate::types::{Vm, VmState};

/// Read the current power state and guest-tools status.
///
/// Always goes to the backend; callers query again before every decision
/// because state can change between calls.
pub fn query(hypervisor: &dyn Hypervisor, vm: &Vm) -> Result<VmState> {
    let power = hypervisor.power_state(vm)?;
    let tools = hypervisor.tools_status(vm)?;
    log::debug!("{vm}: {power}, tools {tools}");
    Ok(VmState { power, tools })
}
