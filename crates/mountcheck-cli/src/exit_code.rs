//! Process exit codes.
//!
//! Scripts driving a conformance run can tell a failing driver (2) apart from
//! a broken setup (3, 4) or a driver that never mounted or unmapped (5, 6).

/// Everything passed.
pub const SUCCESS: u8 = 0;

/// Anything without a more specific code.
pub const GENERAL_ERROR: u8 = 1;

/// The suite ran and at least one probe failed.
pub const PROBES_FAILED: u8 = 2;

/// Configuration could not be loaded or is invalid.
pub const CONFIG_ERROR: u8 = 3;

/// The driver executable could not be started.
pub const SPAWN_FAILED: u8 = 4;

/// A mount never became ready.
pub const MOUNT_TIMEOUT: u8 = 5;

/// `unmap` failed or was not silent.
pub const UNMAP_FAILED: u8 = 6;
