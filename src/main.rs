mod cli;
mod commands;
mod config;
mod lab;
mod progress;
mod prompt;
mod ui;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        quiet: cli.quiet,
        json: cli.json,
    };

    match commands::lifecycle::run(&ctx, &cli) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if let Some(err) = e.downcast_ref::<vmkit::Error>() {
                if err.is_fatal() {
                    eprintln!("  No machines were touched");
                }
                eprintln!("  {}", err.kind().advice());
            }
            ExitCode::FAILURE
        }
    }
}
