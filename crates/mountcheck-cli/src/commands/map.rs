//! Map command - map a volume and keep it mapped for manual inspection.
//!
//! The mount is unmapped through the driver when the user presses Ctrl-C,
//! so a manual session ends the same way a probe's does.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use mountcheck_core::{MountSession, MountSpec};

use crate::config::ConfigArgs;

const WAIT_TICK: Duration = Duration::from_millis(200);

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Map read-only
    #[arg(long)]
    pub read_only: bool,

    /// Volume label reported by the mount
    #[arg(long, value_name = "NAME")]
    pub volume_name: Option<String>,

    /// Volume serial number reported by the mount
    #[arg(long, value_name = "SERIAL")]
    pub volume_serial: Option<u32>,
}

impl Args {
    fn spec(&self, mountpoint: &std::path::Path) -> MountSpec {
        let mut spec = MountSpec::new(mountpoint).read_only(self.read_only);
        if let Some(name) = &self.volume_name {
            spec = spec.volume_name(name.clone());
        }
        if let Some(serial) = self.volume_serial {
            spec = spec.volume_serial(serial);
        }
        spec
    }
}

#[instrument(level = "info", name = "cmd::map", skip_all, fields(read_only = args.read_only))]
pub fn execute(args: &Args, config_args: &ConfigArgs) -> Result<()> {
    let (config, _) = config_args.resolve()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt, unmapping...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let session = MountSession::map(&config.driver(), args.spec(&config.mountpoint))
        .with_context(|| format!("Failed to map {}", config.mountpoint.display()))?;
    eprintln!(
        "Mapped {} (driver pid {}). Press Ctrl-C to unmap.",
        session.mountpoint().display(),
        session.pid()
    );

    while running.load(Ordering::SeqCst) {
        thread::sleep(WAIT_TICK);
    }

    let mountpoint = session.mountpoint().to_path_buf();
    session
        .unmap()
        .with_context(|| format!("Failed to unmap {}", mountpoint.display()))?;
    eprintln!("Unmapped {}", mountpoint.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn spec_carries_volume_options() {
        let args = Args {
            read_only: true,
            volume_name: Some("TestCeph".into()),
            volume_serial: Some(1234567890),
        };
        let spec = args.spec(Path::new("/mnt/y"));
        assert!(spec.is_read_only());
        assert_eq!(spec.label(), Some("TestCeph"));
        assert_eq!(spec.serial(), Some(1234567890));
        assert_eq!(spec.mountpoint(), Path::new("/mnt/y"));
    }

    #[test]
    fn bare_spec_has_no_options() {
        let args = Args {
            read_only: false,
            volume_name: None,
            volume_serial: None,
        };
        let spec = args.spec(Path::new("/mnt/x"));
        assert!(!spec.is_read_only());
        assert_eq!(spec.label(), None);
        assert_eq!(spec.serial(), None);
    }
}
