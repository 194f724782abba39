//! Filesystem behavior checks run against a live mount.
//!
//! Each probe exercises one behavior and asserts an exact outcome. Probes
//! receive a [`ProbeContext`] that exposes the shared mount's root and a
//! per-case mount scope for mapping alternate mountpoints; everything a
//! probe maps through the context is unmapped by the orchestrator after the
//! probe returns, whether it passed or not.

mod assertions;
mod directories;
mod files;
mod mount;
mod persistence;
mod read_only;
mod reserved;
mod volume;

pub use assertions::{ensure, ensure_absent, ensure_bytes_equal, ensure_eq, ensure_exists};
pub use directories::{DirectoryHierarchy, RecursiveEnumeration};
pub use files::{CopyAndDelete, CreateDeleteOnClose, WriteDeleteOnClose, WriteReadRoundtrip};
pub use mount::MountCycle;
pub use persistence::CrossMountPersistence;
pub use read_only::ReadOnlyEnforcement;
pub use reserved::ReservedProbe;
pub use volume::{FreeSpace, VolumeInformation};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::HarnessConfig;
use crate::driver::MountSpec;
use crate::error::HarnessError;
use crate::fsops::FilesystemError;
use crate::orchestrator::MountScope;

/// A single filesystem behavior check.
pub trait Probe: Send + Sync {
    /// Stable snake_case name.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// How many alternate mountpoints the probe maps.
    fn alternate_mountpoints(&self) -> usize {
        0
    }

    /// Reserved probes run as no-ops and are reported as such.
    fn is_reserved(&self) -> bool {
        false
    }

    /// Run the check.
    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure>;
}

/// Why a probe did not pass.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// The filesystem behaved, but not as expected.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A filesystem operation the probe relies on failed.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Mapping or unmapping failed inside the probe.
    #[error(transparent)]
    Infrastructure(#[from] HarnessError),
}

impl ProbeFailure {
    /// Build an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// True when the harness, not the filesystem, is at fault.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}

/// A probe name that does not exist in the suite.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown probe '{0}'")]
pub struct UnknownProbe(pub String);

/// What a probe can see and do.
pub struct ProbeContext<'a> {
    root: &'a Path,
    scope: MountScope<'a>,
    config: &'a HarnessConfig,
}

impl<'a> ProbeContext<'a> {
    /// Context over the shared mount at `root`.
    pub fn new(root: &'a Path, scope: MountScope<'a>, config: &'a HarnessConfig) -> Self {
        Self {
            root,
            scope,
            config,
        }
    }

    /// Root of the shared mount.
    pub fn root(&self) -> &Path {
        self.root
    }

    /// Path below the shared mount's root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Run configuration.
    pub fn config(&self) -> &HarnessConfig {
        self.config
    }

    /// `<prefix>_<uuid>`, unique per call.
    pub fn unique_name(prefix: &str) -> String {
        format!("{prefix}_{}", uuid::Uuid::new_v4())
    }

    /// Unique path below the shared mount's root.
    pub fn unique_path(&self, prefix: &str) -> PathBuf {
        self.root.join(Self::unique_name(prefix))
    }

    /// Configured alternate mountpoint `index`.
    pub fn alternate(&self, index: usize) -> Result<PathBuf, ProbeFailure> {
        let alternates = &self.config.alternate_mountpoints;
        alternates.get(index).cloned().ok_or_else(|| {
            HarnessError::MissingAlternate {
                index,
                available: alternates.len(),
            }
            .into()
        })
    }

    /// Map a per-case mount; returns its root.
    pub fn map(&mut self, spec: MountSpec) -> Result<PathBuf, ProbeFailure> {
        Ok(self.scope.map(spec)?)
    }

    /// Unmap a per-case mount mapped through this context.
    pub fn unmap(&mut self, mountpoint: &Path) -> Result<(), ProbeFailure> {
        Ok(self.scope.unmap(mountpoint)?)
    }

    /// Unmap whatever the probe left mapped; returns how many mounts that was.
    pub fn finish(self) -> Result<usize, HarnessError> {
        self.scope.release()
    }
}

/// Every probe, in execution order.
pub fn default_suite() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(MountCycle),
        Box::new(CreateDeleteOnClose),
        Box::new(WriteDeleteOnClose),
        Box::new(WriteReadRoundtrip),
        Box::new(DirectoryHierarchy),
        Box::new(ReadOnlyEnforcement),
        Box::new(CrossMountPersistence),
        Box::new(RecursiveEnumeration),
        Box::new(CopyAndDelete),
        Box::new(VolumeInformation),
        Box::new(FreeSpace),
        Box::new(ReservedProbe::FILE_TIMES),
        Box::new(ReservedProbe::FILE_SECURITY),
        Box::new(ReservedProbe::ALLOCATION_SIZE),
    ]
}

/// Filter `suite` by name: keep `only` (all when empty), then drop `skip`.
/// Suite order is preserved.
pub fn select(
    suite: Vec<Box<dyn Probe>>,
    only: &[String],
    skip: &[String],
) -> Result<Vec<Box<dyn Probe>>, UnknownProbe> {
    if let Some(unknown) = only
        .iter()
        .chain(skip)
        .find(|name| !suite.iter().any(|p| p.name() == name.as_str()))
    {
        return Err(UnknownProbe(unknown.clone()));
    }

    Ok(suite
        .into_iter()
        .filter(|p| only.is_empty() || only.iter().any(|n| n == p.name()))
        .filter(|p| !skip.iter().any(|n| n == p.name()))
        .collect())
}
