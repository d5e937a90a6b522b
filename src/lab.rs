//! Simulated lab loaded from a TOML inventory (`--simulate`).
//!
//! ```toml
//! [[vm]]
//! name = "web01"
//! power = "on"            # on | off | suspended
//! tools = "ok"            # ok | not-installed | not-ready
//! snapshots = ["10-01-2026-09-30"]
//! ```
//!
//! Omitted `tools` is `not-ready` for a suspended machine and `ok` otherwise.

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use vmkit::backend::memory::{MemoryBackend, SimVm};
use vmkit::snapshot::NAME_FORMAT;
use vmkit::{PowerState, ToolsStatus};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Inventory {
    #[serde(default)]
    vm: Vec<VmEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VmEntry {
    name: String,
    #[serde(default)]
    power: Power,
    #[serde(default)]
    tools: Option<Tools>,
    #[serde(default)]
    snapshots: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Power {
    On,
    #[default]
    Off,
    Suspended,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Tools {
    Ok,
    NotInstalled,
    NotReady,
}

impl From<Power> for PowerState {
    fn from(power: Power) -> Self {
        match power {
            Power::On => Self::PoweredOn,
            Power::Off => Self::PoweredOff,
            Power::Suspended => Self::Suspended,
        }
    }
}

impl Tools {
    /// Suspended guests are not running their tools.
    fn default_for(power: Power) -> Self {
        match power {
            Power::Suspended => Self::NotReady,
            Power::On | Power::Off => Self::Ok,
        }
    }
}

impl From<Tools> for ToolsStatus {
    fn from(tools: Tools) -> Self {
        match tools {
            Tools::Ok => Self::Ok,
            Tools::NotInstalled => Self::NotInstalled,
            Tools::NotReady => Self::NotReady,
        }
    }
}

/// Load an inventory file into a fresh simulated backend.
pub fn load(path: &Path) -> Result<MemoryBackend> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read inventory {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid inventory {}", path.display()))
}

pub fn parse(content: &str) -> Result<MemoryBackend> {
    let inventory: Inventory = toml::from_str(content)?;
    let backend = MemoryBackend::new();
    let mut seen = HashSet::new();

    for entry in inventory.vm {
        if !seen.insert(entry.name.clone()) {
            bail!("duplicate machine name '{}'", entry.name);
        }

        let tools = entry
            .tools
            .unwrap_or_else(|| Tools::default_for(entry.power));
        let mut vm = SimVm::new(&entry.name)
            .power(entry.power.into())
            .tools(tools.into());

        // Names in our own format carry their creation time; anything else
        // is ordered by its position in the list.
        let base = Utc::now() - Duration::days(365);
        for (i, name) in entry.snapshots.iter().enumerate() {
            let created = NaiveDateTime::parse_from_str(name, NAME_FORMAT)
                .map(|t| Utc.from_utc_datetime(&t))
                .unwrap_or_else(|_| base + Duration::minutes(i as i64));
            vm = vm.snapshot(name, created);
        }

        backend.add_vm(vm);
    }

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmkit::{Hypervisor, Vm};

    #[test]
    fn test_parse_inventory() {
        let backend = parse(
            r#"
[[vm]]
name = "web01"
power = "on"
tools = "not-ready"

[[vm]]
name = "db01"
snapshots = ["01-15-2025-08-00"]
"#,
        )
        .unwrap();

        let web = backend.vm("web01").unwrap();
        assert_eq!(web.power, PowerState::PoweredOn);
        assert_eq!(web.tools, ToolsStatus::NotReady);

        let db = backend.vm("db01").unwrap();
        assert_eq!(db.power, PowerState::PoweredOff);
        assert_eq!(db.snapshots.len(), 1);
    }

    #[test]
    fn test_tools_default_follows_power() {
        let backend = parse(
            r#"
[[vm]]
name = "idle01"
power = "suspended"

[[vm]]
name = "idle02"
power = "suspended"
tools = "ok"

[[vm]]
name = "web01"
power = "on"
"#,
        )
        .unwrap();

        assert_eq!(backend.vm("idle01").unwrap().tools, ToolsStatus::NotReady);
        assert_eq!(backend.vm("idle02").unwrap().tools, ToolsStatus::Ok);
        assert_eq!(backend.vm("web01").unwrap().tools, ToolsStatus::Ok);
    }

    #[test]
    fn test_snapshot_order_follows_timestamps() {
        let backend = parse(
            r#"
[[vm]]
name = "web01"
snapshots = ["03-01-2025-10-00", "01-01-2025-10-00"]
"#,
        )
        .unwrap();
        let latest = vmkit::snapshot::latest(&backend, &Vm::new("web01"))
            .unwrap()
            .unwrap();
        assert_eq!(latest.name, "03-01-2025-10-00");
    }

    #[test]
    fn test_unknown_power_state_rejected() {
        assert!(parse("[[vm]]\nname = \"a\"\npower = \"hibernating\"").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = parse("[[vm]]\nname = \"a\"\n[[vm]]\nname = \"a\"").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_inventory() {
        let backend = parse("").unwrap();
        assert!(backend.list_vms().unwrap().is_empty());
    }
}
