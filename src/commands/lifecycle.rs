//! The one labvm command: run an action across a target set.

use anyhow::{Context, Result};
use std::sync::Arc;
use vmkit::backend::govc::GovcConnector;
use vmkit::backend::memory::MemoryConnector;
use vmkit::{
    BatchOptions, BatchReport, CancelToken, Connector, Session, SystemClock, batch, target,
};

use crate::Context as AppContext;
use crate::cli::Cli;
use crate::config::{Config, Settings};
use crate::lab;
use crate::progress::BatchProgress;
use crate::prompt::TerminalCredentials;
use crate::ui;

pub fn run(ctx: &AppContext, cli: &Cli) -> Result<BatchReport> {
    let config = Config::load(cli.config.as_deref())?;
    let settings = Settings::resolve(cli, &config);
    let action = cli.action.normalize();

    let connector: Box<dyn Connector> = match &cli.simulate {
        Some(path) => {
            let backend = lab::load(path)?;
            log::info!("simulating lab from {}", path.display());
            Box::new(MemoryConnector::new(backend))
        }
        None => Box::new(GovcConnector::new(&settings.govc, settings.insecure)),
    };

    let session = Session::acquire(
        connector.as_ref(),
        cli.host.as_deref(),
        settings.username.as_deref(),
        &TerminalCredentials,
    )
    .context("Could not establish a session")?;
    if let Some(host) = session.host().filter(|_| !ctx.quiet && !ctx.json) {
        ui::info(&format!("Connected to {host}"));
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);
    if let Some(timeout) = settings.timeout {
        cancel.cancel_after(timeout);
    }

    let raw = &cli.machine_name;
    let targets = target::resolve(raw, session.hypervisor())
        .with_context(|| format!("Could not resolve machines from '{raw}'"))?;

    if !ctx.quiet && !ctx.json {
        let title = capitalize(action.as_str());
        ui::header(&format!("{title} {} machine(s)", targets.len()));
        if cli.action.as_str() != action.as_str() {
            ui::dim(&format!("'{}' runs as '{action}'", cli.action));
        }
    }

    let options = BatchOptions {
        jobs: settings.jobs,
        shutdown: settings.shutdown,
        cancel: cancel.clone(),
        clock: Arc::new(SystemClock),
    };

    let progress = BatchProgress::new(targets.len(), ctx.quiet || ctx.json);
    let report = batch::run(&session, action, &targets, &options, &progress);
    progress.finish();
    let report = report?;

    if let Err(e) = session.release() {
        ui::warn(&format!("Failed to close session: {e}"));
    }

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if ctx.quiet {
        for vm in report.reports.iter().filter(|r| r.outcome.is_error()) {
            ui::print_vm_report(vm);
        }
    } else {
        ui::print_report(&report);
    }

    if cancel.is_cancelled() && !ctx.json {
        ui::warn("Batch was cancelled before all machines were processed");
    }

    Ok(report)
}

fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        log::warn!("interrupt received, cancelling remaining machines");
        token.cancel();
    }) {
        log::warn!("failed to set Ctrl-C handler: {err}");
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
