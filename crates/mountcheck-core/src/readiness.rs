//! Waiting for a freshly mapped drive to become observable.
//!
//! A driver's `map` command returns control long before the OS can see the
//! new volume, so the harness polls a [`ReadinessProbe`] on a fixed schedule.
//! The schedule is bounded: `max_attempts` evaluations, `interval` apart,
//! with no sleep after the final attempt.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::TimeoutError;

/// Default number of readiness checks before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;

/// Default delay between readiness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Predicate that decides whether a mountpoint is usable.
///
/// Implementations hold no state between calls. Any `Fn(&Path) -> bool`
/// closure is a probe.
pub trait ReadinessProbe: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }

    /// Evaluate the predicate once.
    fn is_ready(&self, mountpoint: &Path) -> bool;
}

impl<F> ReadinessProbe for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn is_ready(&self, mountpoint: &Path) -> bool {
        self(mountpoint)
    }
}

/// Opens the mount root for a low-level read handle.
///
/// On Windows this is a backup-semantics open, which is how a directory
/// handle is obtained; elsewhere the directory itself is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenHandleProbe;

impl ReadinessProbe for OpenHandleProbe {
    fn name(&self) -> &str {
        "open-handle"
    }

    #[cfg(windows)]
    fn is_ready(&self, mountpoint: &Path) -> bool {
        use std::os::windows::fs::OpenOptionsExt;
        use windows_sys::Win32::Storage::FileSystem::{FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_READ};

        fs::OpenOptions::new()
            .read(true)
            .share_mode(FILE_SHARE_READ)
            .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
            .open(mountpoint)
            .is_ok()
    }

    #[cfg(not(windows))]
    fn is_ready(&self, mountpoint: &Path) -> bool {
        fs::File::open(mountpoint).is_ok()
    }
}

/// Metadata query on the mount root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistsProbe;

impl ReadinessProbe for ExistsProbe {
    fn name(&self) -> &str {
        "exists"
    }

    fn is_ready(&self, mountpoint: &Path) -> bool {
        fs::metadata(mountpoint).is_ok()
    }
}

/// The mount root reports a different device than its parent directory.
///
/// This is the reliable signal for kernel mounts on an existing empty
/// directory, where the path exists long before the filesystem is attached.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceChangedProbe;

#[cfg(unix)]
impl ReadinessProbe for DeviceChangedProbe {
    fn name(&self) -> &str {
        "device-changed"
    }

    fn is_ready(&self, mountpoint: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;

        let Some(parent) = mountpoint.parent() else {
            return false;
        };
        let Ok(parent_meta) = fs::metadata(parent) else {
            return false;
        };
        fs::metadata(mountpoint).is_ok_and(|meta| meta.dev() != parent_meta.dev())
    }
}

/// Built-in probe selection, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessKind {
    /// [`OpenHandleProbe`]
    OpenHandle,
    /// [`ExistsProbe`]
    Exists,
    /// `DeviceChangedProbe`; falls back to [`ExistsProbe`] off Unix.
    DeviceChanged,
}

impl ReadinessKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 3] = [Self::OpenHandle, Self::Exists, Self::DeviceChanged];

    /// Configuration name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenHandle => "open-handle",
            Self::Exists => "exists",
            Self::DeviceChanged => "device-changed",
        }
    }

    /// Instantiate the probe.
    pub fn build(self) -> Arc<dyn ReadinessProbe> {
        match self {
            Self::OpenHandle => Arc::new(OpenHandleProbe),
            Self::Exists => Arc::new(ExistsProbe),
            #[cfg(unix)]
            Self::DeviceChanged => Arc::new(DeviceChangedProbe),
            #[cfg(not(unix))]
            Self::DeviceChanged => Arc::new(ExistsProbe),
        }
    }
}

impl Default for ReadinessKind {
    fn default() -> Self {
        if cfg!(windows) {
            Self::OpenHandle
        } else {
            Self::DeviceChanged
        }
    }
}

impl fmt::Display for ReadinessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadinessKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!(
                    "unknown readiness probe '{s}' (expected one of: {})",
                    names.join(", ")
                )
            })
    }
}

/// Bounded retry loop around a [`ReadinessProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPoller {
    max_attempts: u32,
    interval: Duration,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }
}

impl ReadinessPoller {
    /// Create a poller. At least one attempt is always made.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Maximum number of predicate evaluations.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between evaluations.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on time spent sleeping, excluding probe evaluation.
    pub fn max_wait(&self) -> Duration {
        self.interval * (self.max_attempts - 1)
    }

    /// Evaluate `probe` until it holds or the attempts run out.
    ///
    /// Returns the number of attempts it took.
    pub fn wait_until_ready(
        &self,
        probe: &dyn ReadinessProbe,
        mountpoint: &Path,
    ) -> Result<u32, TimeoutError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            if probe.is_ready(mountpoint) {
                debug!(
                    probe = probe.name(),
                    mountpoint = %mountpoint.display(),
                    attempts,
                    "Mount ready"
                );
                return Ok(attempts);
            }
            trace!(probe = probe.name(), attempts, "Mount not ready yet");

            if attempts >= self.max_attempts {
                return Err(TimeoutError {
                    path: mountpoint.to_path_buf(),
                    attempts,
                });
            }
            std::thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn ready_on_first_attempt_does_not_sleep() {
        let poller = ReadinessPoller::new(5, Duration::from_secs(10));
        let started = Instant::now();
        let attempts = poller
            .wait_until_ready(&|_: &Path| true, Path::new("/"))
            .unwrap();
        assert_eq!(attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn ready_after_a_few_attempts() {
        let calls = AtomicU32::new(0);
        let probe = |_: &Path| calls.fetch_add(1, Ordering::SeqCst) + 1 >= 3;
        let poller = ReadinessPoller::new(10, Duration::from_millis(1));

        let attempts = poller.wait_until_ready(&probe, Path::new("/")).unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhaustion_reports_path_and_attempts() {
        let poller = ReadinessPoller::new(4, Duration::from_millis(1));
        let err = poller
            .wait_until_ready(&|_: &Path| false, Path::new("/mnt/never"))
            .unwrap_err();
        assert_eq!(
            err,
            TimeoutError {
                path: "/mnt/never".into(),
                attempts: 4,
            }
        );
    }

    #[test]
    fn no_sleep_after_final_attempt() {
        // Two attempts means exactly one sleep.
        let poller = ReadinessPoller::new(2, Duration::from_millis(300));
        let started = Instant::now();
        let _ = poller.wait_until_ready(&|_: &Path| false, Path::new("/"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(600), "slept too long: {elapsed:?}");
    }

    #[test]
    fn max_wait_counts_sleeps_between_attempts() {
        let poller = ReadinessPoller::new(10, Duration::from_secs(1));
        assert_eq!(poller.max_wait(), Duration::from_secs(9));
        assert_eq!(ReadinessPoller::new(1, Duration::from_secs(1)).max_wait(), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_still_checks_once() {
        let poller = ReadinessPoller::new(0, Duration::ZERO);
        assert_eq!(poller.max_attempts(), 1);
        assert!(poller.wait_until_ready(&|_: &Path| true, Path::new("/")).is_ok());
    }

    #[test]
    fn exists_probe_tracks_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        assert!(!ExistsProbe.is_ready(&target));
        fs::create_dir(&target).unwrap();
        assert!(ExistsProbe.is_ready(&target));
    }

    #[test]
    fn open_handle_probe_opens_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(OpenHandleProbe.is_ready(dir.path()));
        assert!(!OpenHandleProbe.is_ready(&dir.path().join("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn device_changed_probe_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        fs::create_dir(&target).unwrap();
        assert!(!DeviceChangedProbe.is_ready(&target));
    }

    #[test]
    fn readiness_kind_parses_config_names() {
        for kind in ReadinessKind::ALL {
            assert_eq!(kind.as_str().parse::<ReadinessKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert!("eventually".parse::<ReadinessKind>().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn built_probes_report_their_kind() {
        for kind in ReadinessKind::ALL {
            assert_eq!(kind.build().name(), kind.as_str());
        }
    }

    proptest! {
        #[test]
        fn never_ready_probe_is_called_exactly_max_attempts(max in 1u32..8) {
            let calls = AtomicU32::new(0);
            let probe = |_: &Path| {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            };
            let poller = ReadinessPoller::new(max, Duration::ZERO);
            let err = poller.wait_until_ready(&probe, Path::new("/")).unwrap_err();
            prop_assert_eq!(err.attempts, max);
            prop_assert_eq!(calls.load(Ordering::SeqCst), max);
        }

        #[test]
        fn success_on_attempt_n_uses_n_attempts(max in 1u32..8, ready_at in 1u32..8) {
            prop_assume!(ready_at <= max);
            let calls = AtomicU32::new(0);
            let probe = |_: &Path| calls.fetch_add(1, Ordering::SeqCst) + 1 >= ready_at;
            let poller = ReadinessPoller::new(max, Duration::ZERO);
            prop_assert_eq!(poller.wait_until_ready(&probe, Path::new("/")).unwrap(), ready_at);
        }
    }
}
