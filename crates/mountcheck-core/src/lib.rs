//! Conformance harness for mountable filesystem drivers.
//!
//! The driver under test is a black box: the harness only talks to it
//! through its command line (`map` / `unmap`) and through ordinary OS file
//! APIs against the mounted path.
//!
//! # Components
//!
//! - [`ProcessController`] - Owns one spawned driver process
//! - [`ReadinessPoller`] - Bounded retry loop that waits for a mount to appear
//! - [`MountSession`] - Atomic map (spawn + wait) and unmap (command + join)
//! - [`probes`] - Filesystem behavior checks run against a live mount
//! - [`Orchestrator`] - Shared mount setup, per-case mount scopes, teardown
//!
//! # Example
//!
//! ```no_run
//! use mountcheck_core::{HarnessConfig, Orchestrator, probes};
//!
//! let config = HarnessConfig::default();
//! let orchestrator = Orchestrator::new(config)?;
//! let report = orchestrator.run(&probes::default_suite())?;
//! println!("{} passed, {} failed", report.passed(), report.failed());
//! # Ok::<(), mountcheck_core::HarnessError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod fsops;
pub mod orchestrator;
pub mod platform;
pub mod probes;
pub mod process;
pub mod readiness;
pub mod report;
pub mod session;

pub use config::{
    ConfigError, HarnessConfig, PollConfig, ReadOnlyExpectation, VolumeExpectation,
};
pub use driver::{Driver, MountSpec, unmap_args};
pub use error::{HarnessError, TimeoutError, UnmapError};
pub use fsops::{FilesystemError, FsErrorKind, FsOperation};
pub use orchestrator::{MountScope, Orchestrator};
pub use probes::{Probe, ProbeContext, ProbeFailure};
pub use process::{CommandOutput, ProcessController};
pub use readiness::{
    DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, ExistsProbe, OpenHandleProbe, ReadinessKind,
    ReadinessPoller, ReadinessProbe,
};
pub use report::{ProbeOutcome, SuiteReport};
pub use session::{MapTimeout, MountSession, MountState, PendingMount};

#[cfg(unix)]
pub use readiness::DeviceChangedProbe;
