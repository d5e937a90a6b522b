//! vSphere/ESXi backend driving the `govc` CLI.
//!
//! Connection parameters are handed to each spawned `govc` through its
//! environment (`GOVC_URL`, `GOVC_USERNAME`, `GOVC_PASSWORD`, `GOVC_INSECURE`).
//! An ambient session is one whose `GOVC_URL` is already exported in this
//! process.

use crate::backend::{Connector, Hypervisor};
use crate::error::{Error, Result};
use crate::types::{Credential, PowerState, Snapshot, ToolsStatus, Vm};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::process::{Command, Output};

/// Environment variable holding the ambient connection URL.
pub const GOVC_URL: &str = "GOVC_URL";

/// Backend that executes real `govc` commands.
#[derive(Debug, Clone)]
pub struct GovcBackend {
    /// Path to the govc executable
    govc: String,
    /// Extra environment for every invocation (empty for ambient sessions)
    env: Vec<(String, String)>,
}

impl GovcBackend {
    /// Backend relying on the ambient `GOVC_*` environment.
    pub fn ambient(govc: impl Into<String>) -> Self {
        Self {
            govc: govc.into(),
            env: Vec::new(),
        }
    }

    /// Backend bound to an explicit host.
    pub fn for_host(
        govc: impl Into<String>,
        host: &str,
        credential: &Credential,
        insecure: bool,
    ) -> Self {
        let env = vec![
            (GOVC_URL.to_string(), host.to_string()),
            ("GOVC_USERNAME".to_string(), credential.username.clone()),
            ("GOVC_PASSWORD".to_string(), credential.password.clone()),
            (
                "GOVC_INSECURE".to_string(),
                if insecure { "1" } else { "0" }.to_string(),
            ),
        ];
        Self {
            govc: govc.into(),
            env,
        }
    }

    /// Run a govc command and return output.
    fn run_govc(&self, args: &[&str]) -> Result<Output> {
        log::debug!("govc {}", args.join(" "));
        Command::new(&self.govc)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {}: {e}", self.govc),
                stderr: String::new(),
            })
    }

    /// Run a govc command and check for success.
    fn run_govc_checked(&self, args: &[&str], subject: Option<&str>) -> Result<String> {
        let output = self.run_govc(args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_govc_output(&stderr, subject));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn vm_info(&self, name: &str) -> Result<VmInfo> {
        let stdout = self.run_govc_checked(&["vm.info", "-json", name], Some(name))?;
        parse_vm_info(&stdout)?.ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    fn power(&self, vm: &Vm, flags: &[&str]) -> Result<()> {
        let mut args = vec!["vm.power"];
        args.extend_from_slice(flags);
        args.push(vm_arg(vm));
        self.run_govc_checked(&args, Some(&vm.name))?;
        Ok(())
    }
}

/// Prefer the inventory path when known, it is unambiguous.
fn vm_arg(vm: &Vm) -> &str {
    vm.path.as_deref().unwrap_or(&vm.name)
}

/// Snapshots are addressed by managed object id when the host gave one.
fn snapshot_arg(snapshot: &Snapshot) -> &str {
    snapshot.id.as_deref().unwrap_or(&snapshot.name)
}

impl Hypervisor for GovcBackend {
    fn list_vms(&self) -> Result<Vec<Vm>> {
        let stdout = self.run_govc_checked(&["find", "/", "-type", "m"], None)?;
        Ok(parse_find_output(&stdout))
    }

    fn get_vm(&self, name: &str) -> Result<Vm> {
        let info = self.vm_info(name)?;
        Ok(Vm::new(info.name))
    }

    fn power_state(&self, vm: &Vm) -> Result<PowerState> {
        self.vm_info(vm_arg(vm))?.power_state()
    }

    fn tools_status(&self, vm: &Vm) -> Result<ToolsStatus> {
        Ok(self.vm_info(vm_arg(vm))?.tools_status())
    }

    fn start(&self, vm: &Vm) -> Result<()> {
        self.power(vm, &["-on"])
    }

    fn hard_stop(&self, vm: &Vm) -> Result<()> {
        self.power(vm, &["-off", "-force"])
    }

    fn guest_shutdown(&self, vm: &Vm) -> Result<()> {
        self.power(vm, &["-s"])
    }

    fn guest_restart(&self, vm: &Vm) -> Result<()> {
        self.power(vm, &["-r"])
    }

    fn suspend(&self, vm: &Vm) -> Result<()> {
        self.power(vm, &["-suspend"])
    }

    fn list_snapshots(&self, vm: &Vm) -> Result<Vec<Snapshot>> {
        let output = self.run_govc(&["snapshot.tree", "-vm", vm_arg(vm), "-json"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // govc reports a VM without snapshots as an error
            if stderr.to_lowercase().contains("no snapshots") {
                return Ok(Vec::new());
            }
            return Err(Error::from_govc_output(&stderr, Some(&vm.name)));
        }
        parse_snapshot_tree(&String::from_utf8_lossy(&output.stdout), &vm.name)
    }

    fn create_snapshot(&self, vm: &Vm, name: &str) -> Result<()> {
        self.run_govc_checked(
            &["snapshot.create", "-vm", vm_arg(vm), name],
            Some(&vm.name),
        )?;
        Ok(())
    }

    fn delete_snapshot(&self, vm: &Vm, snapshot: &Snapshot) -> Result<()> {
        self.run_govc_checked(
            &["snapshot.remove", "-vm", vm_arg(vm), snapshot_arg(snapshot)],
            Some(&vm.name),
        )?;
        Ok(())
    }

    fn revert_to_snapshot(&self, vm: &Vm, snapshot: &Snapshot) -> Result<()> {
        self.run_govc_checked(
            &["snapshot.revert", "-vm", vm_arg(vm), snapshot_arg(snapshot)],
            Some(&vm.name),
        )?;
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.run_govc_checked(&["session.logout"], None)?;
        Ok(())
    }
}

/// Opens [`GovcBackend`] sessions.
#[derive(Debug, Clone)]
pub struct GovcConnector {
    govc: String,
    insecure: bool,
}

impl GovcConnector {
    pub fn new(govc: impl Into<String>, insecure: bool) -> Self {
        Self {
            govc: govc.into(),
            insecure,
        }
    }
}

impl Connector for GovcConnector {
    fn connect(&self, host: &str, credential: &Credential) -> Result<Box<dyn Hypervisor>> {
        let backend = GovcBackend::for_host(&self.govc, host, credential, self.insecure);
        // Validates reachability and credentials before any VM is touched
        backend.run_govc_checked(&["about"], Some(host))?;
        log::info!("connected to {host} as {}", credential.username);
        Ok(Box::new(backend))
    }

    fn ambient(&self) -> Result<Option<Box<dyn Hypervisor>>> {
        match std::env::var(GOVC_URL) {
            Ok(url) if !url.trim().is_empty() => {
                log::debug!("reusing ambient session for {url}");
                Ok(Some(Box::new(GovcBackend::ambient(&self.govc))))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Output parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct VmInfoResponse {
    #[serde(rename = "virtualMachines", alias = "VirtualMachines", default)]
    virtual_machines: Option<Vec<VmInfo>>,
}

#[derive(Debug, Deserialize)]
struct VmInfo {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Runtime")]
    runtime: Runtime,
    #[serde(alias = "Guest", default)]
    guest: Option<GuestInfo>,
}

#[derive(Debug, Deserialize)]
struct Runtime {
    #[serde(rename = "powerState", alias = "PowerState")]
    power_state: String,
}

#[derive(Debug, Deserialize)]
struct GuestInfo {
    #[serde(rename = "toolsStatus", alias = "ToolsStatus", default)]
    tools_status: Option<String>,
    #[serde(rename = "toolsRunningStatus", alias = "ToolsRunningStatus", default)]
    tools_running_status: Option<String>,
}

impl VmInfo {
    fn power_state(&self) -> Result<PowerState> {
        match self.runtime.power_state.as_str() {
            "poweredOn" => Ok(PowerState::PoweredOn),
            "poweredOff" => Ok(PowerState::PoweredOff),
            "suspended" => Ok(PowerState::Suspended),
            other => Err(Error::Other(format!(
                "unexpected power state '{other}' for {}",
                self.name
            ))),
        }
    }

    fn tools_status(&self) -> ToolsStatus {
        let Some(guest) = &self.guest else {
            return ToolsStatus::NotReady;
        };
        match guest.tools_status.as_deref() {
            Some("toolsNotInstalled") => ToolsStatus::NotInstalled,
            Some("toolsOk" | "toolsOld") => match guest.tools_running_status.as_deref() {
                None | Some("guestToolsRunning") => ToolsStatus::Ok,
                Some(_) => ToolsStatus::NotReady,
            },
            _ => ToolsStatus::NotReady,
        }
    }
}

fn parse_vm_info(json: &str) -> Result<Option<VmInfo>> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    let response: VmInfoResponse = serde_json::from_str(json)?;
    Ok(response
        .virtual_machines
        .and_then(|vms| vms.into_iter().next()))
}

/// Inventory paths from `govc find`, one per line.
fn parse_find_output(stdout: &str) -> Vec<Vm> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|path| {
            let name = path.rsplit('/').next().unwrap_or(path);
            Vm::new(name).with_path(path)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotTreeResponse {
    List(Vec<SnapshotNode>),
    Root {
        #[serde(rename = "rootSnapshotList", alias = "RootSnapshotList", default)]
        root_snapshot_list: Vec<SnapshotNode>,
    },
}

#[derive(Debug, Deserialize)]
struct SnapshotNode {
    #[serde(alias = "Name")]
    name: String,
    #[serde(rename = "createTime", alias = "CreateTime")]
    create_time: DateTime<Utc>,
    #[serde(alias = "Snapshot", default)]
    snapshot: Option<MoRef>,
    #[serde(rename = "childSnapshotList", alias = "ChildSnapshotList", default)]
    child_snapshot_list: Vec<SnapshotNode>,
}

#[derive(Debug, Deserialize)]
struct MoRef {
    #[serde(alias = "Value")]
    value: String,
}

fn parse_snapshot_tree(json: &str, vm: &str) -> Result<Vec<Snapshot>> {
    if json.trim().is_empty() || json.trim() == "null" {
        return Ok(Vec::new());
    }
    let roots = match serde_json::from_str::<SnapshotTreeResponse>(json)? {
        SnapshotTreeResponse::List(nodes) => nodes,
        SnapshotTreeResponse::Root { root_snapshot_list } => root_snapshot_list,
    };

    let mut out = Vec::new();
    let mut stack = roots;
    while let Some(node) = stack.pop() {
        out.push(Snapshot {
            name: node.name,
            created: node.create_time,
            vm: vm.to_string(),
            id: node.snapshot.map(|m| m.value),
        });
        stack.extend(node.child_snapshot_list);
    }
    Ok(out)
}
