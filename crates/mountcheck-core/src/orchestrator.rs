//! Suite sequencing: one shared mount, per-case mount scopes, teardown.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, info_span, warn};

use crate::config::HarnessConfig;
use crate::driver::{Driver, MountSpec};
use crate::error::HarnessError;
use crate::probes::{Probe, ProbeContext, ProbeFailure};
use crate::report::{ProbeOutcome, SuiteReport};
use crate::session::MountSession;

/// Mounts opened during one probe.
///
/// Refuses to map a mountpoint that is already mapped, including the shared
/// one. Whatever is still mapped when the scope is released is unmapped in
/// reverse order.
#[derive(Debug)]
pub struct MountScope<'a> {
    driver: &'a Driver,
    reserved: Vec<PathBuf>,
    sessions: Vec<MountSession>,
}

impl<'a> MountScope<'a> {
    /// Empty scope. Mountpoints in `reserved` can never be mapped through it.
    pub fn new(driver: &'a Driver, reserved: Vec<PathBuf>) -> Self {
        Self {
            driver,
            reserved,
            sessions: Vec::new(),
        }
    }

    /// Map `spec` and track the session; returns the mount root.
    pub fn map(&mut self, spec: MountSpec) -> Result<PathBuf, HarnessError> {
        let mountpoint = spec.mountpoint().to_path_buf();
        if self.is_mapped(&mountpoint) {
            return Err(HarnessError::AlreadyMapped(mountpoint));
        }
        let session = MountSession::map(self.driver, spec)?;
        self.sessions.push(session);
        Ok(mountpoint)
    }

    /// Unmap a mount this scope mapped.
    pub fn unmap(&mut self, mountpoint: &Path) -> Result<(), HarnessError> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.mountpoint() == mountpoint)
            .ok_or_else(|| HarnessError::NotMapped(mountpoint.to_path_buf()))?;
        self.sessions.remove(index).unmap()
    }

    /// Whether `mountpoint` is mapped here or reserved.
    pub fn is_mapped(&self, mountpoint: &Path) -> bool {
        self.reserved.iter().any(|p| p == mountpoint)
            || self.sessions.iter().any(|s| s.mountpoint() == mountpoint)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Unmap everything still mapped, newest first. Every unmap is attempted;
    /// the first error is returned.
    pub fn release(mut self) -> Result<usize, HarnessError> {
        let count = self.sessions.len();
        let mut first_error = None;
        while let Some(session) = self.sessions.pop() {
            let mountpoint = session.mountpoint().to_path_buf();
            warn!(mountpoint = %mountpoint.display(), "Unmapping mount left behind by probe");
            if let Err(e) = session.unmap() {
                error!(mountpoint = %mountpoint.display(), error = %e, "Cleanup unmap failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }
}

/// Runs probes against a driver.
#[derive(Debug)]
pub struct Orchestrator {
    config: HarnessConfig,
    driver: Driver,
}

impl Orchestrator {
    /// Validate `config` and build the driver it describes.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let driver = config.driver();
        Ok(Self { config, driver })
    }

    /// Use a custom driver, e.g. one with a closure readiness probe.
    pub fn with_driver(config: HarnessConfig, driver: Driver) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self { config, driver })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Driver in effect.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Run `probes` in order.
    ///
    /// Setup failure (the shared mount cannot be mapped) is returned as an
    /// error. Everything after that lands in the report: probe failures,
    /// cleanup failures (which abort the remaining probes) and teardown
    /// failures.
    pub fn run(&self, probes: &[Box<dyn Probe>]) -> Result<SuiteReport, HarnessError> {
        let mut report = SuiteReport::new(self.config.mountpoint.clone());
        let shared = MountSession::map(&self.driver, MountSpec::new(&self.config.mountpoint))?;
        info!(
            mountpoint = %shared.mountpoint().display(),
            probes = probes.len(),
            "Suite setup complete"
        );

        for probe in probes {
            let (outcome, abort) = self.run_probe(probe.as_ref(), shared.mountpoint());
            report.outcomes.push(outcome);
            if let Some(error) = abort {
                report.infrastructure_errors.push(error);
                report.aborted = true;
                let remaining = probes.len() - report.outcomes.len();
                error!(remaining, "Aborting suite after cleanup failure");
                break;
            }
        }

        if let Err(e) = shared.unmap() {
            error!(error = %e, "Suite teardown failed");
            report
                .infrastructure_errors
                .push(format!("teardown: {e}"));
        }
        info!(
            passed = report.passed(),
            failed = report.failed(),
            aborted = report.aborted,
            "Suite finished"
        );
        Ok(report)
    }

    /// Run one probe in a fresh scope. The second element is set when cleanup
    /// failed and the suite must stop.
    fn run_probe(&self, probe: &dyn Probe, root: &Path) -> (ProbeOutcome, Option<String>) {
        let span = info_span!("probe", name = probe.name());
        let _guard = span.enter();
        let started = Instant::now();

        let needed = probe.alternate_mountpoints();
        let available = self.config.alternate_mountpoints.len();
        if needed > available {
            let detail = format!("needs {needed} alternate mountpoints, {available} configured");
            warn!(%detail, "Probe not runnable");
            return (
                ProbeOutcome::failed(probe.name(), detail, true, started.elapsed()),
                None,
            );
        }

        let scope = MountScope::new(&self.driver, vec![root.to_path_buf()]);
        let mut ctx = ProbeContext::new(root, scope, &self.config);
        let result = panic::catch_unwind(AssertUnwindSafe(|| probe.run(&mut ctx)))
            .unwrap_or_else(|payload| Err(ProbeFailure::assertion(panic_message(payload.as_ref()))));
        let cleanup = ctx.finish();

        let mut outcome = ProbeOutcome::from_result(probe, &result, started.elapsed());
        match &result {
            Ok(()) => info!("Passed"),
            Err(failure) => warn!(%failure, "Failed"),
        }

        match cleanup {
            Ok(0) => (outcome, None),
            Ok(count) => {
                info!(count, "Cleaned up mounts left by probe");
                (outcome, None)
            }
            Err(e) => {
                let message = e.to_string();
                outcome.fail_cleanup(&message);
                (outcome, Some(format!("{}: {message}", probe.name())))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let text = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("probe panicked: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_refuses_reserved_mountpoint() {
        let driver = Driver::new("/nonexistent/driver");
        let mut scope = MountScope::new(&driver, vec![PathBuf::from("/mnt/x")]);
        let err = scope.map(MountSpec::new("/mnt/x")).unwrap_err();
        assert!(matches!(err, HarnessError::AlreadyMapped(p) if p == Path::new("/mnt/x")));
        assert!(scope.is_empty());
    }

    #[test]
    fn empty_scope_releases_cleanly() {
        let driver = Driver::new("/nonexistent/driver");
        let scope = MountScope::new(&driver, Vec::new());
        assert_eq!(scope.release().unwrap(), 0);
    }

    #[test]
    fn unmapping_unknown_mountpoint_fails() {
        let driver = Driver::new("/nonexistent/driver");
        let mut scope = MountScope::new(&driver, Vec::new());
        let err = scope.unmap(Path::new("/mnt/y")).unwrap_err();
        assert!(matches!(err, HarnessError::NotMapped(_)), "got {err:?}");
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "probe panicked: boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "probe panicked: owned");
    }
}
