use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmkit::ShutdownPolicy;

use crate::cli::Cli;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("labvm"))
}

/// Optional settings file. Every field may be omitted.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the govc binary
    pub govc: Option<String>,
    /// Skip TLS verification for --host sessions
    pub insecure: Option<bool>,
    /// Default user name for --host sessions
    pub username: Option<String>,
    pub jobs: Option<usize>,
    pub poll_delay_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref()),
            None => config_dir()?.join("config.toml"),
        };

        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Effective settings after applying CLI overrides on top of the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub govc: String,
    pub insecure: bool,
    pub username: Option<String>,
    pub jobs: usize,
    pub shutdown: ShutdownPolicy,
    pub timeout: Option<Duration>,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        let defaults = ShutdownPolicy::default();
        let poll_delay = cli
            .poll_delay
            .or(config.poll_delay_secs)
            .map_or(defaults.poll_delay, Duration::from_secs);
        let max_attempts = cli
            .max_attempts
            .or(config.max_attempts)
            .unwrap_or(defaults.max_attempts);

        Self {
            govc: config.govc.clone().unwrap_or_else(|| "govc".to_string()),
            insecure: config.insecure.unwrap_or(false),
            username: cli.user.clone().or_else(|| config.username.clone()),
            jobs: cli.jobs.or(config.jobs).unwrap_or(1).max(1),
            shutdown: ShutdownPolicy::new(poll_delay, max_attempts),
            timeout: cli.timeout.map(Duration::from_secs),
        }
    }
}
