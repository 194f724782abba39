//! Configuration lookup and command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use mountcheck_core::HarnessConfig;

/// Where the configuration comes from and what to override in it.
#[derive(ClapArgs, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// Config file (default: <config dir>/mountcheck/config.toml if present)
    #[arg(long, env = "MOUNTCHECK_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Driver executable
    #[arg(long, global = true, value_name = "PATH")]
    pub driver: Option<PathBuf>,

    /// Shared mountpoint
    #[arg(long, global = true, value_name = "PATH")]
    pub mountpoint: Option<PathBuf>,

    /// Alternate mountpoint (repeatable, replaces the configured list)
    #[arg(long = "alt-mountpoint", global = true, value_name = "PATH")]
    pub alt_mountpoints: Vec<PathBuf>,

    /// Readiness poll attempts
    #[arg(long, global = true, value_name = "N")]
    pub attempts: Option<u32>,

    /// Delay between readiness polls (e.g. "500ms", "2s")
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub interval: Option<Duration>,
}

impl ConfigArgs {
    /// Load the effective configuration, apply overrides and validate.
    ///
    /// Returns the file that was read, if any.
    pub fn resolve(&self) -> Result<(HarnessConfig, Option<PathBuf>)> {
        let (mut config, source) = HarnessConfig::load_effective(self.config.as_deref())
            .context("Failed to load configuration")?;
        self.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        if let Some(path) = &source {
            tracing::debug!(path = %path.display(), "Configuration loaded");
        }
        Ok((config, source))
    }

    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(driver) = &self.driver {
            config.driver.clone_from(driver);
        }
        if let Some(mountpoint) = &self.mountpoint {
            config.mountpoint.clone_from(mountpoint);
        }
        if !self.alt_mountpoints.is_empty() {
            config.alternate_mountpoints.clone_from(&self.alt_mountpoints);
        }
        if let Some(attempts) = self.attempts {
            config.poll.max_attempts = attempts;
        }
        if let Some(interval) = self.interval {
            config.poll.interval = interval;
        }
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(text).map_err(|e| e.to_string())
}

/// Human-readable description of where a configuration came from.
pub fn describe_source(source: Option<&Path>) -> String {
    source.map_or_else(|| "built-in defaults".to_string(), |p| p.display().to_string())
}
