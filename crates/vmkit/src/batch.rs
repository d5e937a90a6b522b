//! Batch execution over many VMs.
//!
//! Each target is looked up, queried and dispatched independently. A failure
//! on one VM is recorded in its [`VmReport`] and never stops the rest. Reports
//! come back in input order regardless of how many workers ran.

use crate::action::Action;
use crate::cancel::CancelToken;
use crate::dispatch::{self, DispatchContext};
use crate::error::{Error, ErrorKind, Result};
use crate::session::Session;
use crate::snapshot::{Clock, SystemClock};
use crate::state;
use crate::types::ShutdownPolicy;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Result of one action on one VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The operation was carried out
    Success { detail: String },
    /// VM was already in the requested state
    NoOp { reason: String },
    /// Action not allowed from the current state
    PolicyRejected { reason: String },
    /// Lookup, query or operation failed
    Error { kind: ErrorKind, message: String },
    /// Not run, or interrupted, because the batch was cancelled
    Cancelled,
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    fn from_error(error: &Error) -> Self {
        match error {
            Error::Cancelled => Self::Cancelled,
            e => Self::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { detail } => f.write_str(detail),
            Self::NoOp { reason } | Self::PolicyRejected { reason } => f.write_str(reason),
            Self::Error { message, .. } => f.write_str(message),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmReport {
    /// Target name as given
    pub vm: String,
    pub action: Action,
    pub outcome: Outcome,
}

/// Counts per outcome category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: usize,
    pub no_op: usize,
    pub rejected: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { .. } => self.success += 1,
            Outcome::NoOp { .. } => self.no_op += 1,
            Outcome::PolicyRejected { .. } => self.rejected += 1,
            Outcome::Error { .. } => self.error += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.no_op + self.rejected + self.error + self.cancelled
    }

    /// True when no VM reported an error.
    pub fn is_success(&self) -> bool {
        self.error == 0
    }
}

/// Ordered per-VM reports for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub reports: Vec<VmReport>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for report in &self.reports {
            summary.add(&report.outcome);
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }
}

/// Execution options.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Number of VMs processed concurrently (1 = sequential)
    pub jobs: usize,
    pub shutdown: ShutdownPolicy,
    pub cancel: CancelToken,
    /// Time source for snapshot names
    pub clock: Arc<dyn Clock>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            shutdown: ShutdownPolicy::default(),
            cancel: CancelToken::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Progress hooks. Called from worker threads when `jobs > 1`.
pub trait BatchObserver: Send + Sync {
    /// Called before a VM is processed.
    fn on_vm_start(&self, _vm: &str, _action: Action) {}

    /// Called after a VM has been processed.
    fn on_vm_complete(&self, _report: &VmReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl BatchObserver for NoObserver {}

/// Run `action` against every target through `session`.
///
/// Only failing to build the worker pool is an error here; per-VM failures
/// end up in the report.
pub fn run(
    session: &Session,
    action: Action,
    targets: &[String],
    options: &BatchOptions,
    observer: &dyn BatchObserver,
) -> Result<BatchReport> {
    log::info!(
        "running {action} on {} machine(s) with {} job(s)",
        targets.len(),
        options.jobs
    );

    let reports = if options.jobs <= 1 || targets.len() <= 1 {
        targets
            .iter()
            .map(|target| process(session, action, target, options, observer))
            .collect()
    } else {
        run_parallel(session, action, targets, options, observer)?
    };

    Ok(BatchReport { reports })
}

fn run_parallel(
    session: &Session,
    action: Action,
    targets: &[String],
    options: &BatchOptions,
    observer: &dyn BatchObserver,
) -> Result<Vec<VmReport>> {
    let results: Arc<Mutex<Vec<(usize, VmReport)>>> =
        Arc::new(Mutex::new(Vec::with_capacity(targets.len())));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .map_err(|e| Error::Other(format!("failed to create thread pool: {e}")))?;

    pool.install(|| {
        targets.par_iter().enumerate().for_each(|(index, target)| {
            let report = process(session, action, target, options, observer);
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((index, report));
        });
    });

    let mut results = match Arc::try_unwrap(results) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(shared) => shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect(),
    };
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, report)| report).collect())
}

fn process(
    session: &Session,
    action: Action,
    target: &str,
    options: &BatchOptions,
    observer: &dyn BatchObserver,
) -> VmReport {
    observer.on_vm_start(target, action);

    let outcome = if options.cancel.is_cancelled() {
        log::info!("{target}: skipped, batch cancelled");
        Outcome::Cancelled
    } else {
        execute_one(session, action, target, options)
    };

    let report = VmReport {
        vm: target.to_string(),
        action,
        outcome,
    };
    observer.on_vm_complete(&report);
    report
}

fn execute_one(session: &Session, action: Action, name: &str, options: &BatchOptions) -> Outcome {
    let hypervisor = session.hypervisor();

    let looked_up = hypervisor
        .get_vm(name)
        .and_then(|vm| state::query(hypervisor, &vm).map(|state| (vm, state)));

    let (vm, vm_state) = match looked_up {
        Ok(found) => found,
        Err(e) => {
            log::error!("{name}: {e}");
            return Outcome::from_error(&e);
        }
    };

    let ctx = DispatchContext {
        hypervisor,
        policy: &options.shutdown,
        cancel: &options.cancel,
        clock: options.clock.as_ref(),
    };
    dispatch::dispatch(&ctx, &vm, action, vm_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, MemoryConnector, SimVm};
    use crate::session::StaticCredentials;
    use crate::types::{Credential, PowerState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(backend: &MemoryBackend) -> Session {
        let connector = MemoryConnector::new(backend.clone());
        let creds = StaticCredentials(Credential::new("root", "pw"));
        Session::acquire(&connector, None, None, &creds).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        completed: AtomicUsize,
    }

    impl BatchObserver for Counting {
        fn on_vm_start(&self, _vm: &str, _action: Action) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_vm_complete(&self, _report: &VmReport) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_summary_counts() {
        let report = BatchReport {
            reports: vec![
                VmReport {
                    vm: "a".into(),
                    action: Action::Start,
                    outcome: Outcome::Success {
                        detail: "powered on".into(),
                    },
                },
                VmReport {
                    vm: "b".into(),
                    action: Action::Start,
                    outcome: Outcome::NoOp {
                        reason: "already powered on".into(),
                    },
                },
                VmReport {
                    vm: "c".into(),
                    action: Action::Start,
                    outcome: Outcome::Cancelled,
                },
            ],
        };
        let summary = report.summary();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.no_op, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.total(), report.total());
        assert!(report.is_success());
    }

    #[test]
    fn test_unknown_vm_fails_only_itself() {
        let backend = MemoryBackend::new()
            .with_vm(SimVm::new("web01"))
            .with_vm(SimVm::new("db01"));
        let session = session(&backend);

        let report = run(
            &session,
            Action::Start,
            &names(&["web01", "ghost", "db01"]),
            &BatchOptions::default(),
            &NoObserver,
        )
        .unwrap();

        assert!(matches!(report.reports[0].outcome, Outcome::Success { .. }));
        assert!(matches!(
            report.reports[1].outcome,
            Outcome::Error {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
        assert!(matches!(report.reports[2].outcome, Outcome::Success { .. }));
        assert!(!report.is_success());
    }

    #[test]
    fn test_parallel_preserves_input_order() {
        let targets: Vec<String> = (0..12).map(|i| format!("vm{i:02}")).collect();
        let backend = MemoryBackend::new();
        for name in &targets {
            backend.add_vm(SimVm::new(name.clone()));
        }
        let session = session(&backend);
        let options = BatchOptions {
            jobs: 4,
            ..BatchOptions::default()
        };
        let observer = Counting::default();

        let report = run(&session, Action::Start, &targets, &options, &observer).unwrap();

        let order: Vec<_> = report.reports.iter().map(|r| r.vm.clone()).collect();
        assert_eq!(order, targets);
        assert_eq!(report.summary().success, 12);
        assert_eq!(observer.started.load(Ordering::SeqCst), 12);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_cancelled_batch_touches_nothing() {
        let backend = MemoryBackend::new().with_vm(SimVm::new("web01"));
        let session = session(&backend);
        let options = BatchOptions::default();
        options.cancel.cancel();

        let report = run(
            &session,
            Action::Start,
            &names(&["web01", "web01"]),
            &options,
            &NoObserver,
        )
        .unwrap();

        assert_eq!(report.summary().cancelled, 2);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_duplicates_are_processed_twice() {
        let backend =
            MemoryBackend::new().with_vm(SimVm::new("web01").power(PowerState::PoweredOff));
        let session = session(&backend);

        let report = run(
            &session,
            Action::Start,
            &names(&["web01", "web01"]),
            &BatchOptions::default(),
            &NoObserver,
        )
        .unwrap();

        assert!(matches!(report.reports[0].outcome, Outcome::Success { .. }));
        assert!(matches!(report.reports[1].outcome, Outcome::NoOp { .. }));
    }

    #[test]
    fn test_empty_target_list() {
        let backend = MemoryBackend::new();
        let session = session(&backend);
        let report = run(
            &session,
            Action::Stop,
            &[],
            &BatchOptions::default(),
            &NoObserver,
        )
        .unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.is_success());
    }
}
