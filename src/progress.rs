//! Progress bar for batch runs.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use vmkit::{Action, BatchObserver, VmReport};

use crate::ui;

/// Renders one tick per finished machine.
pub struct BatchProgress {
    pb: ProgressBar,
}

impl BatchProgress {
    pub fn new(total: usize, hidden: bool) -> Self {
        let pb = ProgressBar::new(total as u64);
        if hidden {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl BatchObserver for BatchProgress {
    fn on_vm_start(&self, vm: &str, action: Action) {
        self.pb.set_message(format!("{action} {vm}"));
    }

    fn on_vm_complete(&self, report: &VmReport) {
        self.pb
            .set_message(format!("{} {}", ui::symbol(&report.outcome), report.vm));
        self.pb.inc(1);
    }
}
