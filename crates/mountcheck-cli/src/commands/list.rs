//! List command - show the probes the suite runs, in order.

use anyhow::Result;
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color, Table};
use tracing::instrument;

use mountcheck_core::probes::{self, Probe};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::list", skip_all)]
pub fn execute(args: &Args) -> Result<()> {
    let suite = probes::default_suite();
    if args.json {
        let entries: Vec<_> = suite.iter().map(|p| probe_to_json(p.as_ref())).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Probe", "Alternates", "Description"]);
    for probe in &suite {
        let name = if probe.is_reserved() {
            Cell::new(probe.name()).fg(Color::DarkGrey)
        } else {
            Cell::new(probe.name())
        };
        table.add_row(vec![
            name,
            Cell::new(probe.alternate_mountpoints().to_string()),
            Cell::new(probe.description()),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn probe_to_json(probe: &dyn Probe) -> serde_json::Value {
    serde_json::json!({
        "name": probe.name(),
        "description": probe.description(),
        "alternate_mountpoints": probe.alternate_mountpoints(),
        "reserved": probe.is_reserved(),
    })
}
