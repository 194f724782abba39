//! Per-probe outcomes and the suite summary.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::probes::{Probe, ProbeFailure};

/// Detail recorded for probes that ran as no-ops.
pub const RESERVED_DETAIL: &str = "reserved";

/// Result of one probe invocation. Never retried.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    /// Probe name.
    pub name: String,
    /// Whether the probe passed.
    pub passed: bool,
    /// Failure message, or [`RESERVED_DETAIL`].
    pub detail: Option<String>,
    /// Failure was caused by mapping or unmapping, not by filesystem behavior.
    pub infrastructure: bool,
    /// Wall time spent in the probe, cleanup included.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl ProbeOutcome {
    /// Outcome for `probe` given what its `run` returned.
    pub fn from_result(probe: &dyn Probe, result: &Result<(), ProbeFailure>, duration: Duration) -> Self {
        match result {
            Ok(()) => Self {
                name: probe.name().to_string(),
                passed: true,
                detail: probe.is_reserved().then(|| RESERVED_DETAIL.to_string()),
                infrastructure: false,
                duration,
            },
            Err(failure) => Self::failed(probe.name(), failure.to_string(), failure.is_infrastructure(), duration),
        }
    }

    /// A failed outcome.
    pub fn failed(name: &str, detail: String, infrastructure: bool, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: Some(detail),
            infrastructure,
            duration,
        }
    }

    /// Mark the outcome failed because cleanup after the probe failed.
    pub fn fail_cleanup(&mut self, error: &str) {
        let cleanup = format!("cleanup failed: {error}");
        self.detail = Some(match self.detail.take() {
            Some(existing) if !self.passed => format!("{existing}; {cleanup}"),
            _ => cleanup,
        });
        self.passed = false;
        self.infrastructure = true;
    }
}

/// Summary of one suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// When setup began.
    pub started_at: DateTime<Utc>,
    /// Shared mountpoint.
    pub mountpoint: PathBuf,
    /// One entry per probe that ran, in order.
    pub outcomes: Vec<ProbeOutcome>,
    /// Remaining probes were skipped after a cleanup failure.
    pub aborted: bool,
    /// Setup, teardown and cleanup errors.
    pub infrastructure_errors: Vec<String>,
}

impl SuiteReport {
    /// Empty report for a run against `mountpoint`.
    pub fn new(mountpoint: PathBuf) -> Self {
        Self {
            started_at: Utc::now(),
            mountpoint,
            outcomes: Vec::new(),
            aborted: false,
            infrastructure_errors: Vec::new(),
        }
    }

    /// Number of passed probes.
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Number of failed probes.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Every probe passed and the harness itself had no trouble.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.aborted && self.infrastructure_errors.is_empty()
    }

    /// Total probe time.
    pub fn total_duration(&self) -> Duration {
        self.outcomes.iter().map(|o| o.duration).sum()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
