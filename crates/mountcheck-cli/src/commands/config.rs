//! Config command - print the configuration a run would use.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::config::{ConfigArgs, describe_source};

#[instrument(level = "info", name = "cmd::config", skip_all)]
pub fn execute(config_args: &ConfigArgs) -> Result<()> {
    let (config, source) = config_args.resolve()?;
    let text = config.to_toml().context("Failed to render configuration")?;
    println!("# Source: {}", describe_source(source.as_deref()));
    print!("{text}");
    Ok(())
}
