//! Single-slot snapshot retention.
//!
//! Every `snapshot` action replaces the VM's most recent snapshot with a new
//! one named after the current local time, so a VM managed only by this tool
//! carries exactly one snapshot. `revert` always targets the most recent one.

use crate::backend::Hypervisor;
use crate::error::{Error, Result};
use crate::types::{Snapshot, Vm};
use chrono::{DateTime, Local, TimeZone};
use std::fmt;

/// Name format for snapshots created by this tool (`MM-DD-YYYY-HH-mm`).
pub const NAME_FORMAT: &str = "%m-%d-%Y-%H-%M";

/// Source of the current local time for snapshot names.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// Build from local calendar fields. Returns `None` for nonexistent or
    /// ambiguous local times.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

pub fn snapshot_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    now.format(NAME_FORMAT).to_string()
}

/// Most recent snapshot by creation time, if any.
pub fn latest(hypervisor: &dyn Hypervisor, vm: &Vm) -> Result<Option<Snapshot>> {
    let mut snapshots = hypervisor.list_snapshots(vm)?;
    snapshots.sort_by(|a, b| b.created.cmp(&a.created));
    Ok(snapshots.into_iter().next())
}

/// Replace the most recent snapshot with a fresh one. Returns the new name.
///
/// Older snapshots (not created by this tool, or left over from a failed
/// run) are not touched.
pub fn create(hypervisor: &dyn Hypervisor, vm: &Vm, clock: &dyn Clock) -> Result<String> {
    let name = snapshot_name(&clock.now());

    if let Some(previous) = latest(hypervisor, vm)? {
        log::info!("{vm}: removing previous snapshot {}", previous.name);
        hypervisor.delete_snapshot(vm, &previous)?;
    }

    hypervisor.create_snapshot(vm, &name)?;
    log::info!("{vm}: created snapshot {name}");
    Ok(name)
}

/// Revert to the most recent snapshot. Returns its name.
pub fn revert(hypervisor: &dyn Hypervisor, vm: &Vm) -> Result<String> {
    let Some(snapshot) = latest(hypervisor, vm)? else {
        return Err(Error::NoSnapshot {
            vm: vm.name.clone(),
        });
    };

    hypervisor.revert_to_snapshot(vm, &snapshot)?;
    log::info!("{vm}: reverted to snapshot {}", snapshot.name);
    Ok(snapshot.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, Op, SimVm};
    use crate::error::ErrorKind;
    use chrono::{Duration, Utc};

    fn clock() -> FixedClock {
        FixedClock::at(2024, 3, 7, 9, 5).unwrap()
    }

    #[test]
    fn test_name_format() {
        assert_eq!(snapshot_name(&clock().now()), "03-07-2024-09-05");
    }

    #[test]
    fn test_latest_picks_newest_regardless_of_listing_order() {
        let now = Utc::now();
        let backend = MemoryBackend::new().with_vm(
            SimVm::new("web01")
                .snapshot("newest", now)
                .snapshot("oldest", now - Duration::days(2))
                .snapshot("middle", now - Duration::days(1)),
        );
        let snap = latest(&backend, &Vm::new("web01")).unwrap().unwrap();
        assert_eq!(snap.name, "newest");
    }

    #[test]
    fn test_create_on_empty_vm() {
        let backend = MemoryBackend::new().with_vm(SimVm::new("web01"));
        let name = create(&backend, &Vm::new("web01"), &clock()).unwrap();

        assert_eq!(name, "03-07-2024-09-05");
        assert_eq!(backend.mutating_calls("web01"), [Op::CreateSnapshot]);
    }

    #[test]
    fn test_repeated_create_keeps_one_snapshot() {
        let backend = MemoryBackend::new().with_vm(SimVm::new("web01"));
        let vm = Vm::new("web01");

        for minute in 0..4 {
            let clock = FixedClock::at(2024, 3, 7, 10, minute).unwrap();
            create(&backend, &vm, &clock).unwrap();
        }

        let snapshots = backend.vm("web01").unwrap().snapshots;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "03-07-2024-10-03");
    }

    #[test]
    fn test_create_only_removes_most_recent() {
        let now = Utc::now();
        let backend = MemoryBackend::new().with_vm(
            SimVm::new("web01")
                .snapshot("baseline", now - Duration::days(30))
                .snapshot("yesterday", now - Duration::days(1)),
        );
        create(&backend, &Vm::new("web01"), &clock()).unwrap();

        let names: Vec<_> = backend
            .vm("web01")
            .unwrap()
            .snapshots
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["baseline", "03-07-2024-09-05"]);
    }

    #[test]
    fn test_revert_without_snapshot() {
        let backend = MemoryBackend::new().with_vm(SimVm::new("web01"));
        let err = revert(&backend, &Vm::new("web01")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoSnapshot);
        assert!(backend.mutating_calls("web01").is_empty());
    }

    #[test]
    fn test_revert_targets_latest() {
        let now = Utc::now();
        let backend = MemoryBackend::new().with_vm(
            SimVm::new("web01")
                .snapshot("old", now - Duration::hours(5))
                .snapshot("new", now),
        );
        assert_eq!(revert(&backend, &Vm::new("web01")).unwrap(), "new");
        assert_eq!(
            backend.vm("web01").unwrap().reverted_to.as_deref(),
            Some("new")
        );
    }

    #[test]
    fn test_failed_delete_skips_create() {
        let backend =
            MemoryBackend::new().with_vm(SimVm::new("web01").snapshot("old", Utc::now()));
        backend.fail_on("web01", Op::DeleteSnapshot);

        assert!(create(&backend, &Vm::new("web01"), &clock()).is_err());
        assert_eq!(backend.count("web01", Op::CreateSnapshot), 0);
    }
}
