//! Unmap command - detach a volume through the driver.
//!
//! Useful after an interrupted run left a mount behind. The driver must exit
//! successfully without writing to stdout.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::config::ConfigArgs;

#[instrument(level = "info", name = "cmd::unmap", skip_all)]
pub fn execute(config_args: &ConfigArgs) -> Result<()> {
    let (config, _) = config_args.resolve()?;
    config
        .driver()
        .unmap(&config.mountpoint)
        .with_context(|| format!("Failed to unmap {}", config.mountpoint.display()))?;
    eprintln!("Unmapped {}", config.mountpoint.display());
    Ok(())
}
