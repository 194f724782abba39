//! The driver's command-line surface.
//!
//! The driver exposes two subcommands: `map`, which runs for as long as the
//! volume stays mounted, and `unmap`, which detaches it and exits silently.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{HarnessError, UnmapError};
use crate::process::ProcessController;
use crate::readiness::{ReadinessKind, ReadinessPoller, ReadinessProbe};

/// Subcommand that attaches a volume.
pub const MAP_COMMAND: &str = "map";
/// Subcommand that detaches a volume.
pub const UNMAP_COMMAND: &str = "unmap";
/// Flag preceding the mountpoint.
pub const MOUNTPOINT_FLAG: &str = "-l";
/// Flag preceding the volume label.
pub const VOLUME_NAME_FLAG: &str = "--win-vol-name";
/// Flag preceding the volume serial number.
pub const VOLUME_SERIAL_FLAG: &str = "--win-vol-serial";
/// Flag requesting a read-only mount.
pub const READ_ONLY_FLAG: &str = "--read-only";

/// Options for one mount. Immutable once a session is created from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountSpec {
    mountpoint: PathBuf,
    read_only: bool,
    volume_name: Option<String>,
    volume_serial: Option<u32>,
}

impl MountSpec {
    /// Writable mount at `mountpoint` with driver-default volume metadata.
    pub fn new(mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            read_only: false,
            volume_name: None,
            volume_serial: None,
        }
    }

    /// Request a read-only mount.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the volume label.
    #[must_use]
    pub fn volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self
    }

    /// Set the volume serial number.
    #[must_use]
    pub fn volume_serial(mut self, serial: u32) -> Self {
        self.volume_serial = Some(serial);
        self
    }

    /// Where the volume is attached.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Whether the mount rejects writes.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Requested volume label, if any.
    pub fn label(&self) -> Option<&str> {
        self.volume_name.as_deref()
    }

    /// Requested volume serial, if any.
    pub fn serial(&self) -> Option<u32> {
        self.volume_serial
    }

    /// Arguments for the driver's `map` subcommand.
    pub fn map_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            MAP_COMMAND.into(),
            MOUNTPOINT_FLAG.into(),
            self.mountpoint.clone().into_os_string(),
        ];
        if let Some(name) = &self.volume_name {
            args.push(VOLUME_NAME_FLAG.into());
            args.push(name.into());
        }
        if let Some(serial) = self.volume_serial {
            args.push(VOLUME_SERIAL_FLAG.into());
            args.push(serial.to_string().into());
        }
        if self.read_only {
            args.push(READ_ONLY_FLAG.into());
        }
        args
    }
}

/// Arguments for the driver's `unmap` subcommand.
pub fn unmap_args(mountpoint: &Path) -> Vec<OsString> {
    vec![
        UNMAP_COMMAND.into(),
        MOUNTPOINT_FLAG.into(),
        mountpoint.as_os_str().to_owned(),
    ]
}

/// Everything needed to map a volume: the executable and how to wait for it.
#[derive(Clone)]
pub struct Driver {
    executable: PathBuf,
    poller: ReadinessPoller,
    readiness: Arc<dyn ReadinessProbe>,
    terminate_on_timeout: bool,
}

impl Driver {
    /// Driver at `executable` with the default poll schedule and probe.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            poller: ReadinessPoller::default(),
            readiness: ReadinessKind::default().build(),
            terminate_on_timeout: true,
        }
    }

    /// Replace the poll schedule.
    #[must_use]
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Replace the readiness probe.
    #[must_use]
    pub fn with_readiness(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.readiness = probe;
        self
    }

    /// Whether a map that never becomes ready has its process stopped.
    ///
    /// When disabled the process is detached and left running.
    #[must_use]
    pub fn with_terminate_on_timeout(mut self, terminate: bool) -> Self {
        self.terminate_on_timeout = terminate;
        self
    }

    /// Path of the driver binary.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Poll schedule used by `map`.
    pub fn poller(&self) -> &ReadinessPoller {
        &self.poller
    }

    /// Probe used by `map`.
    pub fn readiness(&self) -> &dyn ReadinessProbe {
        self.readiness.as_ref()
    }

    /// See [`Driver::with_terminate_on_timeout`].
    pub fn terminates_on_timeout(&self) -> bool {
        self.terminate_on_timeout
    }

    /// Run `unmap` for `mountpoint` and require silent success.
    ///
    /// Any stdout output is an error even when the exit status is zero.
    pub fn unmap(&self, mountpoint: &Path) -> Result<(), HarnessError> {
        let output = ProcessController::run_to_completion(&self.executable, unmap_args(mountpoint))
            .map_err(|e| UnmapError::Process {
                mountpoint: mountpoint.to_path_buf(),
                source: Box::new(e),
            })?;

        if !output.stdout.is_empty() {
            return Err(UnmapError::UnexpectedOutput {
                mountpoint: mountpoint.to_path_buf(),
                output: output.stdout,
            }
            .into());
        }
        if !output.status.success() {
            if !output.stderr.is_empty() {
                debug!(stderr = %output.stderr.trim_end(), "Unmap stderr");
            }
            return Err(UnmapError::CommandFailed {
                mountpoint: mountpoint.to_path_buf(),
                status: output.status,
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("executable", &self.executable)
            .field("poller", &self.poller)
            .field("readiness", &self.readiness.name())
            .field("terminate_on_timeout", &self.terminate_on_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn plain_map_args() {
        let spec = MountSpec::new("X:\\");
        assert_eq!(strings(&spec.map_args()), ["map", "-l", "X:\\"]);
    }

    #[test]
    fn full_map_args() {
        let spec = MountSpec::new("Y:\\")
            .volume_name("TestCeph")
            .volume_serial(1234567890)
            .read_only(true);
        assert_eq!(
            strings(&spec.map_args()),
            [
                "map",
                "-l",
                "Y:\\",
                "--win-vol-name",
                "TestCeph",
                "--win-vol-serial",
                "1234567890",
                "--read-only",
            ]
        );
    }

    #[test]
    fn unmap_args_name_mountpoint() {
        assert_eq!(
            strings(&unmap_args(Path::new("Z:\\"))),
            ["unmap", "-l", "Z:\\"]
        );
    }

    #[test]
    fn driver_debug_names_probe() {
        let driver = Driver::new("ceph-dokan").with_readiness(ReadinessKind::Exists.build());
        let debug = format!("{driver:?}");
        assert!(debug.contains("ceph-dokan"));
        assert!(debug.contains("\"exists\""));
    }

    proptest! {
        #[test]
        fn map_args_carry_every_option(
            mountpoint in "[a-z]{1,8}",
            name in proptest::option::of("[A-Za-z0-9]{1,12}"),
            serial in proptest::option::of(any::<u32>()),
            read_only in any::<bool>(),
        ) {
            let mut spec = MountSpec::new(&mountpoint).read_only(read_only);
            if let Some(name) = &name {
                spec = spec.volume_name(name.clone());
            }
            if let Some(serial) = serial {
                spec = spec.volume_serial(serial);
            }
            let args = strings(&spec.map_args());

            prop_assert_eq!(&args[0], "map");
            let value_after = |flag: &str| {
                args.iter()
                    .position(|a| a == flag)
                    .and_then(|i| args.get(i + 1).cloned())
            };
            prop_assert_eq!(value_after("-l"), Some(mountpoint));
            prop_assert_eq!(value_after("--win-vol-name"), name);
            prop_assert_eq!(
                value_after("--win-vol-serial").map(|s| s.parse::<u32>().unwrap()),
                serial
            );
            prop_assert_eq!(args.iter().any(|a| a == "--read-only"), read_only);
        }
    }
}
