//! Harness configuration, stored as TOML.
//!
//! ```toml
//! driver = "ceph-dokan"
//! mountpoint = "X:\\"
//! alternate_mountpoints = ["Y:\\", "Z:\\"]
//! readiness = "open-handle"
//! terminate_on_timeout = true
//!
//! [poll]
//! max_attempts = 10
//! interval = "1s"
//!
//! [volume]
//! name = "TestCeph"
//! serial = 1234567890
//! filesystem = "Ceph"
//! max_component_length = 256
//!
//! [read_only]
//! remove_error = "no-such-device"
//! ```
//!
//! Every key is optional; missing keys take platform defaults.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::driver::Driver;
use crate::fsops::FsErrorKind;
use crate::readiness::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, ReadinessKind, ReadinessPoller};

/// File name looked up in the user config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config{}: {source}", origin(.path))]
    Parse {
        /// Config file path, when parsed from a file.
        path: Option<PathBuf>,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// The configuration could not be rendered.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values are individually valid but unusable together.
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}

/// Readiness poll schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Predicate evaluations before giving up.
    pub max_attempts: u32,
    /// Delay between evaluations.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What `volume_information` expects to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeExpectation {
    /// Label passed with `--win-vol-name`.
    pub name: String,
    /// Serial passed with `--win-vol-serial`.
    pub serial: u32,
    /// Filesystem name the driver reports.
    pub filesystem: String,
    /// Longest path component the driver allows.
    pub max_component_length: u64,
}

impl Default for VolumeExpectation {
    fn default() -> Self {
        Self {
            name: "TestCeph".to_string(),
            serial: 1234567890,
            filesystem: "Ceph".to_string(),
            max_component_length: 256,
        }
    }
}

/// What `read_only_enforcement` expects to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadOnlyExpectation {
    /// Reason reported when removing a file from a read-only mount.
    pub remove_error: FsErrorKind,
}

impl Default for ReadOnlyExpectation {
    fn default() -> Self {
        Self {
            remove_error: FsErrorKind::NoSuchDevice,
        }
    }
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Driver executable, resolved through `PATH` when bare.
    pub driver: PathBuf,
    /// Shared mountpoint mapped for the whole suite.
    pub mountpoint: PathBuf,
    /// Extra mountpoints for probes that map their own mounts.
    pub alternate_mountpoints: Vec<PathBuf>,
    /// How readiness is detected.
    pub readiness: ReadinessKind,
    /// Stop the map process when its mount never becomes ready.
    pub terminate_on_timeout: bool,
    /// Readiness poll schedule.
    pub poll: PollConfig,
    /// Volume metadata expectations.
    pub volume: VolumeExpectation,
    /// Read-only mount expectations.
    pub read_only: ReadOnlyExpectation,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let (mountpoint, alternates) = default_mountpoints();
        Self {
            driver: PathBuf::from("ceph-dokan"),
            mountpoint,
            alternate_mountpoints: alternates,
            readiness: ReadinessKind::default(),
            terminate_on_timeout: true,
            poll: PollConfig::default(),
            volume: VolumeExpectation::default(),
            read_only: ReadOnlyExpectation::default(),
        }
    }
}

#[cfg(windows)]
fn default_mountpoints() -> (PathBuf, Vec<PathBuf>) {
    (
        PathBuf::from("X:\\"),
        vec![PathBuf::from("Y:\\"), PathBuf::from("Z:\\")],
    )
}

#[cfg(not(windows))]
fn default_mountpoints() -> (PathBuf, Vec<PathBuf>) {
    let base = PathBuf::from("/tmp/mountcheck");
    (base.join("x"), vec![base.join("y"), base.join("z")])
}

impl HarnessConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// `<user config dir>/mountcheck/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mountcheck")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load `explicit` if given, else the default file if it exists, else
    /// defaults. Returns the file that was used, if any.
    pub fn load_effective(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "Using default config file");
                Ok((Self::load(&path)?, Some(path)))
            }
            _ => Ok((Self::default(), None)),
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations a run cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("driver path is empty".into()));
        }
        if self.mountpoint.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("mountpoint is empty".into()));
        }
        if self.poll.max_attempts == 0 {
            return Err(ConfigError::Invalid("poll.max_attempts must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for alternate in &self.alternate_mountpoints {
            if alternate == &self.mountpoint {
                return Err(ConfigError::Invalid(format!(
                    "alternate mountpoint {} is the shared mountpoint",
                    alternate.display()
                )));
            }
            if !seen.insert(alternate) {
                return Err(ConfigError::Invalid(format!(
                    "alternate mountpoint {} is listed twice",
                    alternate.display()
                )));
            }
        }
        Ok(())
    }

    /// Driver described by this configuration.
    pub fn driver(&self) -> Driver {
        Driver::new(&self.driver)
            .with_poller(ReadinessPoller::new(self.poll.max_attempts, self.poll.interval))
            .with_readiness(self.readiness.build())
            .with_terminate_on_timeout(self.terminate_on_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(HarnessConfig::from_toml_str("").unwrap(), HarnessConfig::default());
    }

    #[test]
    fn defaults_are_valid() {
        HarnessConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_full_file() {
        let config = HarnessConfig::from_toml_str(
            r#"
driver = "C:\\ceph\\ceph-dokan.exe"
mountpoint = "X:\\"
alternate_mountpoints = ["Y:\\", "Z:\\"]
readiness = "open-handle"
terminate_on_timeout = false

[poll]
max_attempts = 20
interval = "250ms"

[volume]
name = "Lab"
serial = 42
filesystem = "NTFS"
max_component_length = 255

[read_only]
remove_error = "read-only-filesystem"
"#,
        )
        .unwrap();

        assert_eq!(config.driver, PathBuf::from("C:\\ceph\\ceph-dokan.exe"));
        assert_eq!(config.alternate_mountpoints.len(), 2);
        assert_eq!(config.readiness, ReadinessKind::OpenHandle);
        assert!(!config.terminate_on_timeout);
        assert_eq!(config.poll.max_attempts, 20);
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.volume.serial, 42);
        assert_eq!(config.read_only.remove_error, FsErrorKind::ReadOnlyFilesystem);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = HarnessConfig::from_toml_str("mountpont = \"/mnt\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn toml_round_trips() {
        let config = HarnessConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(HarnessConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn validation_rejects_zero_attempts() {
        let mut config = HarnessConfig::default();
        config.poll.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validation_rejects_shared_mountpoint_as_alternate() {
        let mut config = HarnessConfig::default();
        config.alternate_mountpoints.push(config.mountpoint.clone());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validation_rejects_duplicate_alternates() {
        let mut config = HarnessConfig::default();
        config.alternate_mountpoints = vec!["/mnt/y".into(), "/mnt/y".into()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HarnessConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mountcheck.toml");
        fs::write(&path, "driver = \"/opt/driver\"\n").unwrap();

        let (config, used) = HarnessConfig::load_effective(Some(&path)).unwrap();
        assert_eq!(config.driver, PathBuf::from("/opt/driver"));
        assert_eq!(used, Some(path));
    }

    #[test]
    fn driver_uses_poll_settings() {
        let mut config = HarnessConfig::default();
        config.poll = PollConfig {
            max_attempts: 3,
            interval: Duration::from_millis(5),
        };
        config.readiness = ReadinessKind::Exists;
        let driver = config.driver();
        assert_eq!(driver.poller().max_attempts(), 3);
        assert_eq!(driver.poller().interval(), Duration::from_millis(5));
        assert_eq!(driver.readiness().name(), "exists");
    }
}
