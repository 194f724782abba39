//! One mounted volume, from `map` to `unmap`.
//!
//! ```text
//! Unmapped --spawn--> Mapping --ready--> Mapped --unmap--> Unmapping --> Unmapped
//! ```
//!
//! [`MountSession::map`] runs the first two transitions as one step.
//! Callers that want to decide for themselves what happens to a map process
//! that never became ready use [`PendingMount`] directly.

use std::fmt;
use std::path::Path;

use tracing::{debug, error, info, instrument, warn};

use crate::driver::{Driver, MountSpec};
use crate::error::{HarnessError, TimeoutError, UnmapError};
use crate::process::ProcessController;

/// Lifecycle state of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// No driver process, nothing attached.
    Unmapped,
    /// Driver spawned, waiting for the volume to appear.
    Mapping,
    /// Volume is usable.
    Mapped,
    /// Unmap issued, waiting for the driver to exit.
    Unmapping,
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unmapped => "unmapped",
            Self::Mapping => "mapping",
            Self::Mapped => "mapped",
            Self::Unmapping => "unmapping",
        };
        f.write_str(name)
    }
}

/// A spawned `map` process whose volume has not been confirmed yet.
#[derive(Debug)]
pub struct PendingMount {
    spec: MountSpec,
    driver: Driver,
    process: ProcessController,
}

/// A pending mount that never became ready, handed back to the caller.
#[derive(Debug)]
pub struct MapTimeout {
    /// Why waiting stopped.
    pub error: TimeoutError,
    /// The still-owned map process.
    pub pending: PendingMount,
}

impl PendingMount {
    /// Spawn the driver's `map` command without waiting.
    pub fn spawn(driver: &Driver, spec: MountSpec) -> Result<Self, HarnessError> {
        let process = ProcessController::spawn(driver.executable(), spec.map_args())?;
        debug!(
            pid = process.pid(),
            mountpoint = %spec.mountpoint().display(),
            max_wait = ?driver.poller().max_wait(),
            "Map process started"
        );
        Ok(Self {
            spec,
            driver: driver.clone(),
            process,
        })
    }

    /// Always [`MountState::Mapping`].
    pub fn state(&self) -> MountState {
        MountState::Mapping
    }

    /// Options this mount was requested with.
    pub fn spec(&self) -> &MountSpec {
        &self.spec
    }

    /// Process id of the map process.
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Poll readiness with the driver's schedule and probe.
    pub fn wait_ready(mut self) -> Result<MountSession, Box<MapTimeout>> {
        let poller = *self.driver.poller();
        match poller.wait_until_ready(self.driver.readiness(), self.spec.mountpoint()) {
            Ok(attempts) => {
                info!(
                    mountpoint = %self.spec.mountpoint().display(),
                    attempts,
                    "Mapped"
                );
                Ok(MountSession {
                    spec: self.spec,
                    process: self.process,
                    driver: self.driver,
                    state: MountState::Mapped,
                })
            }
            Err(error) => {
                // Diagnostics only: an early exit usually explains the timeout.
                if let Ok(Some(status)) = self.process.try_status() {
                    warn!(
                        mountpoint = %self.spec.mountpoint().display(),
                        %status,
                        "Map process exited before the mount became ready"
                    );
                }
                Err(Box::new(MapTimeout {
                    error,
                    pending: self,
                }))
            }
        }
    }

    /// Stop the map process.
    pub fn terminate(mut self) -> Result<(), HarnessError> {
        let status = self.process.terminate()?;
        info!(
            mountpoint = %self.spec.mountpoint().display(),
            %status,
            "Map process terminated"
        );
        Ok(())
    }

    /// Leave the map process running and forget about it.
    pub fn detach(self) -> u32 {
        self.process.detach()
    }
}

/// A mapped volume. Reaches [`MountState::Unmapped`] only through
/// [`MountSession::unmap`].
pub struct MountSession {
    spec: MountSpec,
    driver: Driver,
    process: ProcessController,
    state: MountState,
}

impl MountSession {
    /// Spawn `map` and wait until the volume is observable.
    ///
    /// If the volume never appears the map process is terminated (or detached,
    /// if the driver is configured that way) and the timeout is returned.
    #[instrument(
        level = "info",
        name = "session::map",
        skip_all,
        fields(mountpoint = %spec.mountpoint().display(), read_only = spec.is_read_only())
    )]
    pub fn map(driver: &Driver, spec: MountSpec) -> Result<Self, HarnessError> {
        let pending = PendingMount::spawn(driver, spec)?;
        match pending.wait_ready() {
            Ok(session) => Ok(session),
            Err(timeout) => {
                let MapTimeout { error, pending } = *timeout;
                if driver.terminates_on_timeout() {
                    if let Err(e) = pending.terminate() {
                        error!(error = %e, "Failed to stop map process after timeout");
                    }
                } else {
                    let pid = pending.detach();
                    warn!(pid, "Leaving map process running after timeout");
                }
                Err(error.into())
            }
        }
    }

    /// Run `unmap`, require silent success, then join the map process.
    ///
    /// Never retried. On failure the session is dropped, which stops the map
    /// process if it is still running.
    #[instrument(
        level = "info",
        name = "session::unmap",
        skip_all,
        fields(mountpoint = %self.spec.mountpoint().display())
    )]
    pub fn unmap(mut self) -> Result<(), HarnessError> {
        self.state = MountState::Unmapping;
        let mountpoint = self.spec.mountpoint().to_path_buf();

        self.driver.unmap(&mountpoint)?;

        let status = self.process.join().map_err(|e| UnmapError::Process {
            mountpoint: mountpoint.clone(),
            source: Box::new(e),
        })?;
        if status.code() != Some(0) {
            return Err(UnmapError::MapProcessFailed { mountpoint, status }.into());
        }

        self.state = MountState::Unmapped;
        info!("Unmapped");
        Ok(())
    }

    /// Where the volume is attached.
    pub fn mountpoint(&self) -> &Path {
        self.spec.mountpoint()
    }

    /// Options this session was mapped with.
    pub fn spec(&self) -> &MountSpec {
        &self.spec
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Process id of the map process.
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }
}

impl fmt::Debug for MountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountSession")
            .field("spec", &self.spec)
            .field("pid", &self.process.pid())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        if self.state == MountState::Unmapped {
            return;
        }
        warn!(
            mountpoint = %self.spec.mountpoint().display(),
            state = %self.state,
            "Mount session dropped without a clean unmap, stopping map process"
        );
        if let Err(e) = self.process.terminate() {
            debug!(error = %e, "Map process already gone");
        }
    }
}
