#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mountcheck_core::probes::UnknownProbe;
use mountcheck_core::{ConfigError, HarnessError, TimeoutError, UnmapError};

use crate::commands::{config as config_cmd, list, map, run as run_cmd, unmap};
use crate::config::ConfigArgs;

/// Conformance runner for mountable filesystem drivers
#[derive(Parser)]
#[command(name = "mountcheck")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Run every probe against the configured driver
    mountcheck run

    # Run two probes against a driver on a non-default drive
    mountcheck --driver C:\\ceph\\ceph-dokan.exe --mountpoint W:\\ run --only mount_cycle --only free_space

    # Map a read-only volume and keep it mapped until Ctrl-C
    mountcheck map --read-only --volume-name TestCeph
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the probe suite against the driver
    Run(run_cmd::Args),

    /// List available probes
    List(list::Args),

    /// Map a volume and hold it until interrupted
    Map(map::Args),

    /// Unmap a volume and check the driver stays silent
    Unmap,

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            // Quiet is parsed separately so errors from argument parsing still honor it
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    match cli.command {
        Commands::List(args) => list::execute(&args),
        Commands::Run(args) => run_cmd::execute(&args, &cli.config, cli.quiet),
        Commands::Map(args) => map::execute(&args, &cli.config),
        Commands::Unmap => unmap::execute(&cli.config),
        Commands::Config => config_cmd::execute(&cli.config),
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Map an error to an exit code by walking its chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.downcast_ref::<run_cmd::ProbesFailed>().is_some() {
            return exit_code::PROBES_FAILED;
        }

        if cause.downcast_ref::<ConfigError>().is_some()
            || cause.downcast_ref::<UnknownProbe>().is_some()
        {
            return exit_code::CONFIG_ERROR;
        }

        if let Some(harness_err) = cause.downcast_ref::<HarnessError>() {
            match harness_err {
                HarnessError::Spawn { .. } => return exit_code::SPAWN_FAILED,
                HarnessError::Timeout(_) => return exit_code::MOUNT_TIMEOUT,
                HarnessError::Unmap(_) => return exit_code::UNMAP_FAILED,
                HarnessError::Config(_) | HarnessError::MissingAlternate { .. } => {
                    return exit_code::CONFIG_ERROR;
                }
                _ => {}
            }
        }

        if cause.downcast_ref::<TimeoutError>().is_some() {
            return exit_code::MOUNT_TIMEOUT;
        }
        if cause.downcast_ref::<UnmapError>().is_some() {
            return exit_code::UNMAP_FAILED;
        }
    }

    exit_code::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use clap::CommandFactory;
    use std::path::PathBuf;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn errors_map_to_exit_codes() {
        let timeout: anyhow::Error = HarnessError::from(TimeoutError {
            path: PathBuf::from("/mnt/x"),
            attempts: 10,
        })
        .into();
        assert_eq!(categorize_error(&timeout), exit_code::MOUNT_TIMEOUT);

        let config: anyhow::Error = ConfigError::Invalid("bad".into()).into();
        assert_eq!(
            categorize_error(&config.context("Failed to load configuration")),
            exit_code::CONFIG_ERROR
        );

        let unknown: anyhow::Error = UnknownProbe("nope".into()).into();
        assert_eq!(categorize_error(&unknown), exit_code::CONFIG_ERROR);

        let failed: anyhow::Error = run_cmd::ProbesFailed {
            failed: 1,
            total: 3,
            harness_errors: 0,
        }.into();
        assert_eq!(categorize_error(&failed), exit_code::PROBES_FAILED);

        let other = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&other), exit_code::GENERAL_ERROR);
    }

    #[test]
    fn unclassified_harness_errors_are_general() {
        let result: Result<()> = Err(HarnessError::NotMapped(PathBuf::from("/mnt/y")))
            .context("Failed to unmap");
        let err = result.unwrap_err();
        assert_eq!(categorize_error(&err), exit_code::GENERAL_ERROR);
    }
}
