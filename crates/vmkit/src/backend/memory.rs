//! In-memory simulated lab.
//!
//! Backs the CLI's `--simulate` mode and the test suite. Every call is
//! recorded so callers can assert which operations were issued, and failures
//! can be injected per VM and operation.

use crate::backend::{Connector, Hypervisor};
use crate::error::{Error, Result};
use crate::types::{Credential, PowerState, Snapshot, ToolsStatus, Vm};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Backend operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListVms,
    GetVm,
    PowerState,
    ToolsStatus,
    Start,
    HardStop,
    GuestShutdown,
    GuestRestart,
    Suspend,
    ListSnapshots,
    CreateSnapshot,
    DeleteSnapshot,
    RevertToSnapshot,
    Disconnect,
}

impl Op {
    /// Whether the operation changes VM or snapshot state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::HardStop
                | Self::GuestShutdown
                | Self::GuestRestart
                | Self::Suspend
                | Self::CreateSnapshot
                | Self::DeleteSnapshot
                | Self::RevertToSnapshot
        )
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub vm: Option<String>,
}

/// A simulated VM.
#[derive(Debug, Clone)]
pub struct SimVm {
    pub name: String,
    pub power: PowerState,
    pub tools: ToolsStatus,
    /// Statuses returned by successive tools queries before falling back to `tools`
    pub tools_script: VecDeque<ToolsStatus>,
    pub snapshots: Vec<Snapshot>,
    /// Power state captured by each snapshot, keyed by snapshot id
    pub snapshot_power: HashMap<String, PowerState>,
    /// Name of the snapshot last reverted to
    pub reverted_to: Option<String>,
}

impl SimVm {
    /// A powered-off VM with working tools and no snapshots.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            power: PowerState::PoweredOff,
            tools: ToolsStatus::Ok,
            tools_script: VecDeque::new(),
            snapshots: Vec::new(),
            snapshot_power: HashMap::new(),
            reverted_to: None,
        }
    }

    pub fn power(mut self, power: PowerState) -> Self {
        self.power = power;
        self
    }

    pub fn tools(mut self, tools: ToolsStatus) -> Self {
        self.tools = tools;
        self
    }

    /// Queue statuses for successive tools queries.
    pub fn tools_script(mut self, script: impl IntoIterator<Item = ToolsStatus>) -> Self {
        self.tools_script = script.into_iter().collect();
        self
    }

    /// Add a snapshot capturing the power state set so far.
    pub fn snapshot(mut self, name: impl Into<String>, created: DateTime<Utc>) -> Self {
        let id = format!("snapshot-{}", self.snapshots.len() + 1);
        self.snapshot_power.insert(id.clone(), self.power);
        self.snapshots.push(Snapshot {
            name: name.into(),
            created,
            vm: self.name.clone(),
            id: Some(id),
        });
        self
    }
}

#[derive(Debug, Default)]
struct Lab {
    vms: Vec<SimVm>,
    calls: Vec<Call>,
    failures: HashSet<(String, Op)>,
    next_snapshot_id: usize,
}

impl Lab {
    fn record(&mut self, op: Op, vm: Option<&str>) {
        self.calls.push(Call {
            op,
            vm: vm.map(str::to_string),
        });
    }

    fn check(&self, op: Op, vm: &str) -> Result<()> {
        if self.failures.contains(&(vm.to_string(), op)) {
            return Err(Error::CommandFailed {
                message: format!("simulated {op:?} failure for {vm}"),
                stderr: String::new(),
            });
        }
        Ok(())
    }

    fn vm_mut(&mut self, name: &str) -> Result<&mut SimVm> {
        self.vms
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    /// Record, check injected failures, then run `f` on the VM.
    fn with_vm<T>(
        &mut self,
        op: Op,
        vm: &Vm,
        f: impl FnOnce(&mut SimVm) -> Result<T>,
    ) -> Result<T> {
        self.record(op, Some(&vm.name));
        self.check(op, &vm.name)?;
        let sim = self.vm_mut(&vm.name)?;
        f(sim)
    }
}

/// Shared, cloneable in-memory hypervisor.
///
/// Clones share the same lab, so a test can keep one handle for assertions
/// while the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    lab: Arc<Mutex<Lab>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a VM to the inventory (inventory order is insertion order).
    pub fn with_vm(self, vm: SimVm) -> Self {
        self.add_vm(vm);
        self
    }

    pub fn add_vm(&self, vm: SimVm) {
        self.lock().vms.push(vm);
    }

    /// Make `op` fail for `vm` from now on.
    pub fn fail_on(&self, vm: &str, op: Op) {
        self.lock().failures.insert((vm.to_string(), op));
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Mutating calls issued against `vm`.
    pub fn mutating_calls(&self, vm: &str) -> Vec<Op> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op.is_mutating() && c.vm.as_deref() == Some(vm))
            .map(|c| c.op)
            .collect()
    }

    /// Number of times `op` was issued against `vm`.
    pub fn count(&self, vm: &str, op: Op) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op && c.vm.as_deref() == Some(vm))
            .count()
    }

    /// Number of disconnects issued.
    pub fn disconnects(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == Op::Disconnect)
            .count()
    }

    /// Current simulated state of a VM.
    pub fn vm(&self, name: &str) -> Option<SimVm> {
        self.lock().vms.iter().find(|v| v.name == name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Lab> {
        self.lab.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Hypervisor for MemoryBackend {
    fn list_vms(&self) -> Result<Vec<Vm>> {
        let mut lab = self.lock();
        lab.record(Op::ListVms, None);
        Ok(lab.vms.iter().map(|v| Vm::new(&v.name)).collect())
    }

    fn get_vm(&self, name: &str) -> Result<Vm> {
        let mut lab = self.lock();
        lab.record(Op::GetVm, Some(name));
        lab.check(Op::GetVm, name)?;
        lab.vm_mut(name).map(|v| Vm::new(&v.name))
    }

    fn power_state(&self, vm: &Vm) -> Result<PowerState> {
        self.lock().with_vm(Op::PowerState, vm, |v| Ok(v.power))
    }

    fn tools_status(&self, vm: &Vm) -> Result<ToolsStatus> {
        self.lock().with_vm(Op::ToolsStatus, vm, |v| {
            Ok(v.tools_script.pop_front().unwrap_or(v.tools))
        })
    }

    fn start(&self, vm: &Vm) -> Result<()> {
        self.lock().with_vm(Op::Start, vm, |v| {
            v.power = PowerState::PoweredOn;
            Ok(())
        })
    }

    fn hard_stop(&self, vm: &Vm) -> Result<()> {
        self.lock().with_vm(Op::HardStop, vm, |v| {
            v.power = PowerState::PoweredOff;
            Ok(())
        })
    }

    fn guest_shutdown(&self, vm: &Vm) -> Result<()> {
        self.lock().with_vm(Op::GuestShutdown, vm, |v| {
            if v.power != PowerState::PoweredOn {
                return Err(Error::InvalidState {
                    message: format!("{} is {}", v.name, v.power),
                });
            }
            v.power = PowerState::PoweredOff;
            Ok(())
        })
    }

    fn guest_restart(&self, vm: &Vm) -> Result<()> {
        self.lock().with_vm(Op::GuestRestart, vm, |v| {
            if v.power != PowerState::PoweredOn {
                return Err(Error::InvalidState {
                    message: format!("{} is {}", v.name, v.power),
                });
            }
            Ok(())
        })
    }

    fn suspend(&self, vm: &Vm) -> Result<()> {
        self.lock().with_vm(Op::Suspend, vm, |v| {
            v.power = PowerState::Suspended;
            Ok(())
        })
    }

    fn list_snapshots(&self, vm: &Vm) -> Result<Vec<Snapshot>> {
        self.lock()
            .with_vm(Op::ListSnapshots, vm, |v| Ok(v.snapshots.clone()))
    }

    fn create_snapshot(&self, vm: &Vm, name: &str) -> Result<()> {
        let mut lab = self.lock();
        lab.next_snapshot_id += 1;
        let id = format!("snapshot-sim-{}", lab.next_snapshot_id);
        lab.with_vm(Op::CreateSnapshot, vm, |v| {
            // Creation times stay strictly increasing even within one clock tick.
            let mut created = Utc::now();
            if let Some(last) = v.snapshots.iter().map(|s| s.created).max() {
                if created <= last {
                    created = last + chrono::Duration::seconds(1);
                }
            }
            v.snapshot_power.insert(id.clone(), v.power);
            v.snapshots.push(Snapshot {
                name: name.to_string(),
                created,
                vm: v.name.clone(),
                id: Some(id),
            });
            Ok(())
        })
    }

    fn delete_snapshot(&self, vm: &Vm, snapshot: &Snapshot) -> Result<()> {
        self.lock().with_vm(Op::DeleteSnapshot, vm, |v| {
            let before = v.snapshots.len();
            v.snapshots
                .retain(|s| !(s.name == snapshot.name && s.id == snapshot.id));
            if v.snapshots.len() == before {
                return Err(Error::NotFound {
                    name: snapshot.name.clone(),
                });
            }
            if let Some(id) = &snapshot.id {
                v.snapshot_power.remove(id);
            }
            Ok(())
        })
    }

    fn revert_to_snapshot(&self, vm: &Vm, snapshot: &Snapshot) -> Result<()> {
        self.lock().with_vm(Op::RevertToSnapshot, vm, |v| {
            if !v
                .snapshots
                .iter()
                .any(|s| s.name == snapshot.name && s.id == snapshot.id)
            {
                return Err(Error::NotFound {
                    name: snapshot.name.clone(),
                });
            }
            // A reverted VM comes back in the power state the snapshot captured.
            if let Some(power) = snapshot.id.as_ref().and_then(|id| v.snapshot_power.get(id)) {
                v.power = *power;
            }
            v.reverted_to = Some(snapshot.name.clone());
            Ok(())
        })
    }

    fn disconnect(&self) -> Result<()> {
        self.lock().record(Op::Disconnect, None);
        Ok(())
    }
}

/// Connector handing out [`MemoryBackend`] sessions.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    backend: MemoryBackend,
    ambient: bool,
    password: Option<String>,
}

impl MemoryConnector {
    /// A connector whose lab is also available as the ambient session.
    pub fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            ambient: true,
            password: None,
        }
    }

    /// Whether an ambient session exists.
    pub fn ambient_session(mut self, ambient: bool) -> Self {
        self.ambient = ambient;
        self
    }

    /// Require this password on explicit connects.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, host: &str, credential: &Credential) -> Result<Box<dyn Hypervisor>> {
        if let Some(expected) = &self.password {
            if &credential.password != expected {
                return Err(Error::Authentication {
                    message: format!(
                        "{}@{host}: incorrect user name or password",
                        credential.username
                    ),
                });
            }
        }
        log::debug!("simulated connect to {host} as {}", credential.username);
        Ok(Box::new(self.backend.clone()))
    }

    fn ambient(&self) -> Result<Option<Box<dyn Hypervisor>>> {
        if self.ambient {
            Ok(Some(Box::new(self.backend.clone())))
        } else {
            Ok(None)
        }
    }
}
