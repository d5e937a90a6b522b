//! Action dispatch: map (action, current power state) to an operation.
//!
//! | Action   | PoweredOn      | PoweredOff | Suspended |
//! |----------|----------------|------------|-----------|
//! | start    | no-op          | start      | start     |
//! | stop     | shutdown       | no-op      | shutdown  |
//! | reset    | guest restart  | rejected   | rejected  |
//! | suspend  | suspend        | rejected   | no-op     |
//! | snapshot | create (any state)                      |||
//! | revert   | revert (any state)                      |||

use crate::action::Action;
use crate::backend::Hypervisor;
use crate::batch::Outcome;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::shutdown;
use crate::snapshot::{self, Clock};
use crate::types::{PowerState, ShutdownPolicy, Vm, VmState};

/// What the dispatcher decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    PowerOn,
    Shutdown,
    GuestRestart,
    Suspend,
    CreateSnapshot,
    RevertSnapshot,
    /// Already in the target state
    NoOp(&'static str),
    /// Not allowed from the current state
    Rejected(&'static str),
}

/// Pure transition table lookup.
pub fn plan(action: Action, power: PowerState) -> Transition {
    use PowerState::{PoweredOff, PoweredOn, Suspended};

    match (action, power) {
        (Action::Start, PoweredOn) => Transition::NoOp("already powered on"),
        (Action::Start, PoweredOff | Suspended) => Transition::PowerOn,

        (Action::Stop, PoweredOff) => Transition::NoOp("already powered off"),
        (Action::Stop, PoweredOn | Suspended) => Transition::Shutdown,

        (Action::Reset, PoweredOn) => Transition::GuestRestart,
        (Action::Reset, PoweredOff) => Transition::Rejected("powered off, cannot reset"),
        (Action::Reset, Suspended) => Transition::Rejected("suspended, cannot reset"),

        (Action::Suspend, PoweredOn) => Transition::Suspend,
        (Action::Suspend, PoweredOff) => Transition::Rejected("powered off, cannot suspend"),
        (Action::Suspend, Suspended) => Transition::NoOp("already suspended"),

        (Action::Snapshot, _) => Transition::CreateSnapshot,
        (Action::Revert, _) => Transition::RevertSnapshot,
    }
}

/// Collaborators a dispatch needs besides the VM itself.
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    pub hypervisor: &'a dyn Hypervisor,
    pub policy: &'a ShutdownPolicy,
    pub cancel: &'a CancelToken,
    pub clock: &'a dyn Clock,
}

/// Decide and perform `action` on `vm` given its freshly queried `state`.
///
/// Never fails: backend errors are logged and reported as
/// [`Outcome::Error`], cancellation as [`Outcome::Cancelled`].
pub fn dispatch(ctx: &DispatchContext<'_>, vm: &Vm, action: Action, state: VmState) -> Outcome {
    let transition = plan(action, state.power);
    log::debug!("{vm}: {action} while {} -> {transition:?}", state.power);

    match transition {
        Transition::NoOp(reason) => {
            log::info!("{vm}: {reason}");
            Outcome::NoOp {
                reason: reason.to_string(),
            }
        }
        Transition::Rejected(reason) => {
            log::info!("{vm}: {reason}");
            Outcome::PolicyRejected {
                reason: reason.to_string(),
            }
        }
        _ => match execute(ctx, vm, transition) {
            Ok(detail) => Outcome::Success { detail },
            Err(Error::Cancelled) => Outcome::Cancelled,
            Err(e) => {
                log::error!("{vm}: {action} failed: {e}");
                Outcome::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        },
    }
}

fn execute(ctx: &DispatchContext<'_>, vm: &Vm, transition: Transition) -> Result<String> {
    let hv = ctx.hypervisor;
    match transition {
        Transition::PowerOn => {
            hv.start(vm)?;
            log::info!("{vm}: powered on");
            Ok("powered on".to_string())
        }
        Transition::Shutdown => {
            shutdown::shutdown(hv, vm, ctx.policy, ctx.cancel).map(|o| o.to_string())
        }
        Transition::GuestRestart => {
            hv.guest_restart(vm)?;
            log::info!("{vm}: guest restart requested");
            Ok("guest restart requested".to_string())
        }
        Transition::Suspend => {
            hv.suspend(vm)?;
            log::info!("{vm}: suspended");
            Ok("suspended".to_string())
        }
        Transition::CreateSnapshot => {
            snapshot::create(hv, vm, ctx.clock).map(|name| format!("snapshot {name} created"))
        }
        Transition::RevertSnapshot => {
            snapshot::revert(hv, vm).map(|name| format!("reverted to snapshot {name}"))
        }
        Transition::NoOp(_) | Transition::Rejected(_) => Ok(String::new()),
    }
}
