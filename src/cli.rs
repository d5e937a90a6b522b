use clap::Parser;
use std::path::PathBuf;
use vmkit::ActionRequest;

#[derive(Parser)]
#[command(name = "labvm")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Run lifecycle actions across a set of lab virtual machines", long_about = None)]
#[command(after_help = "\
Actions:
  start, unpause           Power on (no-op if already running)
  stop                     Graceful guest shutdown, hard stop if tools are unavailable
  suspend, pause           Suspend a running machine
  reset                    Restart the guest OS of a running machine
  snapshot                 Replace the latest snapshot with a new one
  revert, reverttosnapshot Revert to the latest snapshot

MACHINE_NAME may be `all`, a name, a comma/semicolon separated list, or a file
listing one machine per line.")]
pub struct Cli {
    /// Lifecycle action to run
    #[arg(value_name = "ACTION")]
    pub action: ActionRequest,

    /// Machine name, list of names, file of names, or `all`
    #[arg(value_name = "MACHINE_NAME", default_value = "all")]
    pub machine_name: String,

    /// Host to connect to (prompts for the password)
    #[arg(short = 'H', long, visible_alias = "esxi-host", env = "LABVM_HOST")]
    pub host: Option<String>,

    /// User name for --host
    #[arg(short, long, visible_alias = "esxi-user-name", env = "LABVM_USER")]
    pub user: Option<String>,

    /// Number of machines to process in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Seconds between guest tools polls during stop
    #[arg(long, value_name = "SECS")]
    pub poll_delay: Option<u64>,

    /// Guest tools polls before falling back to a hard stop
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Cancel the remaining work after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run against a simulated lab described by a TOML inventory
    #[arg(long, value_name = "INVENTORY")]
    pub simulate: Option<PathBuf>,

    /// Config file (default: ~/.config/labvm/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the batch report as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_all_machines() {
        let cli = Cli::try_parse_from(["labvm", "start"]).unwrap();
        assert_eq!(cli.action, ActionRequest::Start);
        assert_eq!(cli.machine_name, "all");
        assert!(cli.host.is_none());
    }

    #[test]
    fn test_action_is_case_insensitive() {
        let cli = Cli::try_parse_from(["labvm", "RevertToSnapshot", "web01"]).unwrap();
        assert_eq!(cli.action, ActionRequest::RevertToSnapshot);
        assert_eq!(cli.machine_name, "web01");
    }

    #[test]
    fn test_unsupported_action_is_rejected() {
        let err = Cli::try_parse_from(["labvm", "destroy"]).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_legacy_option_names() {
        let cli = Cli::try_parse_from([
            "labvm",
            "stop",
            "--esxi-host",
            "esx01",
            "--esxi-user-name",
            "admin",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("esx01"));
        assert_eq!(cli.user.as_deref(), Some("admin"));
    }
}
