//! Error types for mounting, waiting and unmounting.
//!
//! These are infrastructure errors: they mean the harness could not drive the
//! mount lifecycle. Filesystem behavior that does not match expectations is a
//! [`ProbeFailure`](crate::probes::ProbeFailure) instead.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while driving the mount driver.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The driver executable could not be started.
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        /// Executable that was launched.
        program: PathBuf,
        /// OS error from the spawn.
        #[source]
        source: io::Error,
    },

    /// The driver process could not be waited on.
    #[error("failed to wait for process {pid}: {reason}")]
    Join {
        /// Process id of the child.
        pid: u32,
        /// Why the wait failed.
        reason: String,
    },

    /// The mount never became observable.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The unmap sequence did not complete cleanly.
    #[error(transparent)]
    Unmap(#[from] UnmapError),

    /// A second session was requested for a mountpoint that is already mapped.
    #[error("mountpoint {} is already mapped", .0.display())]
    AlreadyMapped(PathBuf),

    /// An unmap was requested for a mountpoint the caller never mapped.
    #[error("mountpoint {} is not mapped", .0.display())]
    NotMapped(PathBuf),

    /// A probe asked for more alternate mountpoints than are configured.
    #[error("no alternate mountpoint #{index} ({available} configured)")]
    MissingAlternate {
        /// Zero-based index that was requested.
        index: usize,
        /// Number of alternates configured.
        available: usize,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The readiness predicate never held within the allowed attempts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timed out waiting for mount {} after {attempts} attempts", .path.display())]
pub struct TimeoutError {
    /// Mountpoint that was polled.
    pub path: PathBuf,
    /// Number of times the predicate was evaluated.
    pub attempts: u32,
}

/// Ways an unmap can fail.
#[derive(Debug, Error)]
pub enum UnmapError {
    /// `unmap` must be silent on success.
    #[error("unmap of {} printed unexpected output: {output:?}", .mountpoint.display())]
    UnexpectedOutput {
        /// Mountpoint being unmapped.
        mountpoint: PathBuf,
        /// Captured stdout of the unmap command.
        output: String,
    },

    /// `unmap` itself exited non-zero.
    #[error("unmap of {} exited with {status}", .mountpoint.display())]
    CommandFailed {
        /// Mountpoint being unmapped.
        mountpoint: PathBuf,
        /// Exit status of the unmap command.
        status: ExitStatus,
    },

    /// The long-running `map` process did not exit cleanly once unmapped.
    #[error("map process for {} exited with {status}", .mountpoint.display())]
    MapProcessFailed {
        /// Mountpoint that was unmapped.
        mountpoint: PathBuf,
        /// Exit status of the map process.
        status: ExitStatus,
    },

    /// The unmap command could not be run, or the map process could not be joined.
    #[error("unmap of {} failed: {source}", .mountpoint.display())]
    Process {
        /// Mountpoint being unmapped.
        mountpoint: PathBuf,
        /// Underlying process error.
        #[source]
        source: Box<HarnessError>,
    },
}
