//! Run command - execute the probe suite against the configured driver.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color, Table};
use tracing::instrument;

use mountcheck_core::probes;
use mountcheck_core::{Orchestrator, SuiteReport};

use crate::config::{ConfigArgs, describe_source};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Run only this probe (repeatable)
    #[arg(long, value_name = "PROBE")]
    pub only: Vec<String>,

    /// Skip this probe (repeatable)
    #[arg(long, value_name = "PROBE")]
    pub skip: Vec<String>,

    /// Write the JSON report to a file ("-" for stdout instead of the table)
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

/// The suite ran to completion but did not pass.
#[derive(Debug)]
pub struct ProbesFailed {
    pub failed: usize,
    pub total: usize,
    pub harness_errors: usize,
}

impl fmt::Display for ProbesFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} probes failed", self.failed, self.total)?;
        if self.harness_errors > 0 {
            write!(f, " ({} harness errors)", self.harness_errors)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProbesFailed {}

#[instrument(
    level = "info",
    name = "cmd::run",
    skip_all,
    fields(only = args.only.len(), skip = args.skip.len())
)]
pub fn execute(args: &Args, config_args: &ConfigArgs, quiet: bool) -> Result<()> {
    let suite = probes::select(probes::default_suite(), &args.only, &args.skip)?;
    if suite.is_empty() {
        anyhow::bail!("No probes selected");
    }

    let (config, source) = config_args.resolve()?;
    if !quiet {
        eprintln!("Driver:     {}", config.driver.display());
        eprintln!("Mountpoint: {}", config.mountpoint.display());
        eprintln!("Config:     {}", describe_source(source.as_deref()));
        eprintln!();
    }

    let orchestrator = Orchestrator::new(config)?;
    let report = orchestrator
        .run(&suite)
        .context("Failed to map the shared mountpoint")?;

    let json_to_stdout = args.json.as_deref() == Some(Path::new("-"));
    if let Some(path) = &args.json {
        let json = report.to_json().context("Failed to serialize report")?;
        if json_to_stdout {
            println!("{json}");
        } else {
            fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
    }
    if !json_to_stdout {
        output_table(&report);
        if !quiet {
            output_summary(&report);
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(ProbesFailed {
            failed: report.failed(),
            total: suite.len(),
            harness_errors: report.infrastructure_errors.len(),
        }
        .into())
    }
}

fn output_table(report: &SuiteReport) {
    let mut table = Table::new();
    table.set_header(vec!["Probe", "Result", "Time", "Detail"]);

    for outcome in &report.outcomes {
        let result = match (outcome.passed, outcome.infrastructure) {
            (true, _) => Cell::new("PASS").fg(Color::Green),
            (false, false) => Cell::new("FAIL").fg(Color::Red),
            (false, true) => Cell::new("ERROR").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(&outcome.name),
            result,
            Cell::new(format!("{:.2?}", outcome.duration)),
            Cell::new(outcome.detail.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
}

fn output_summary(report: &SuiteReport) {
    eprintln!();
    eprintln!(
        "{} passed, {} failed in {:.2?}",
        report.passed(),
        report.failed(),
        report.total_duration()
    );
    if report.aborted {
        eprintln!("Suite aborted after a cleanup failure; remaining probes did not run.");
    }
    for error in &report.infrastructure_errors {
        eprintln!("Harness error: {error}");
    }
}
