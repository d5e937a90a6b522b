//! # vmkit
//!
//! Batch lifecycle orchestration for hypervisor-hosted virtual machines.
//!
//! This crate provides functionality for:
//! - Resolving a target list (`all`, inline names, or a file) against a host
//! - State-guarded power actions that never re-issue an operation a VM has
//!   already reached
//! - Graceful shutdown through guest tools with a bounded poll and hard-stop
//!   fallback
//! - Single-slot snapshot retention and revert-to-latest
//! - Scoped sessions that are only closed when this run opened them
//!
//! ## Example
//!
//! ```no_run
//! use vmkit::backend::govc::GovcConnector;
//! use vmkit::{ActionRequest, BatchOptions, NoObserver, Session, StaticCredentials};
//! use vmkit::{Credential, batch, target};
//!
//! let connector = GovcConnector::new("govc", true);
//! let credentials = StaticCredentials(Credential::new("root", "secret"));
//! let session = Session::acquire(&connector, Some("esx01.lab"), None, &credentials)
//!     .expect("connect failed");
//!
//! let targets = target::resolve("web01,db01", session.hypervisor()).expect("resolve failed");
//! let action = "pause".parse::<ActionRequest>().unwrap().normalize();
//!
//! let report = batch::run(&session, action, &targets, &BatchOptions::default(), &NoObserver)
//!     .expect("batch failed");
//! for entry in &report.reports {
//!     println!("{}: {}", entry.vm, entry.outcome);
//! }
//! session.release().expect("logout failed");
//! ```

#![warn(clippy::all)]

pub mod action;
pub mod backend;
pub mod batch;
pub mod cancel;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod shutdown;
pub mod snapshot;
pub mod state;
pub mod target;
pub mod types;

pub use action::{Action, ActionRequest, UnsupportedAction};
pub use backend::{Connector, Hypervisor};
pub use batch::{
    BatchObserver, BatchOptions, BatchReport, BatchSummary, NoObserver, Outcome, VmReport,
};
pub use cancel::CancelToken;
pub use error::{Error, ErrorKind, Result};
pub use session::{CredentialProvider, Session, StaticCredentials};
pub use shutdown::{HardStopReason, ShutdownOutcome};
pub use snapshot::{Clock, FixedClock, SystemClock};
pub use types::{Credential, PowerState, ShutdownPolicy, Snapshot, ToolsStatus, Vm, VmState};
