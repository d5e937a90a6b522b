use colored::Colorize;
use vmkit::{BatchReport, BatchSummary, Outcome, VmReport};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Status symbol for an outcome
pub fn symbol(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Success { .. } => "✓",
        Outcome::NoOp { .. } => "○",
        Outcome::PolicyRejected { .. } | Outcome::Cancelled => "⊘",
        Outcome::Error { .. } => "✗",
    }
}

/// One line per machine
pub fn print_vm_report(report: &VmReport) {
    let sym = symbol(&report.outcome);
    let sym = match &report.outcome {
        Outcome::Success { .. } => sym.green(),
        Outcome::NoOp { .. } => sym.blue(),
        Outcome::PolicyRejected { .. } | Outcome::Cancelled => sym.yellow(),
        Outcome::Error { .. } => sym.red(),
    };

    match &report.outcome {
        Outcome::Error { kind, message } => {
            println!(
                "  {} {}: {} ({})",
                sym,
                report.vm.bold(),
                message,
                kind.label().red()
            );
            println!("      {}", kind.advice().dimmed());
        }
        outcome => println!("  {} {}: {}", sym, report.vm.bold(), outcome),
    }
}

/// Print every machine's outcome followed by the summary
pub fn print_report(report: &BatchReport) {
    for vm in &report.reports {
        print_vm_report(vm);
    }
    print_summary(&report.summary());
}

/// Print final summary
pub fn print_summary(summary: &BatchSummary) {
    println!();
    if summary.total() == 0 {
        println!("  {} No machines matched", "ℹ".blue().bold());
    } else if summary.is_success() {
        println!(
            "  {} {} machine(s) processed",
            "✓".green().bold(),
            summary.total()
        );
    } else {
        println!(
            "  {} {} machine(s) processed with errors",
            "⚠".yellow().bold(),
            summary.total()
        );
    }

    for line in summary_lines(summary) {
        println!("    • {line}");
    }
}

fn summary_lines(summary: &BatchSummary) -> Vec<String> {
    let mut lines = Vec::new();
    if summary.success > 0 {
        lines.push(format!("{} succeeded", summary.success));
    }
    if summary.no_op > 0 {
        lines.push(format!("{} already in the requested state", summary.no_op));
    }
    if summary.rejected > 0 {
        lines.push(format!("{} rejected", summary.rejected));
    }
    if summary.cancelled > 0 {
        lines.push(format!("{} cancelled", summary.cancelled));
    }
    if summary.error > 0 {
        lines.push(format!("{} {}", summary.error, "failed".red()));
    }
    lines
}
