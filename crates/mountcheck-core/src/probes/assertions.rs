//! Assertion helpers that fail a probe instead of panicking.
//!
//! Messages show sizes and the first differing byte rather than dumping
//! whole buffers.

use std::fmt::Debug;
use std::path::Path;

use super::ProbeFailure;
use crate::fsops;

/// Fail with `message()` unless `condition` holds.
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ProbeFailure> {
    if condition {
        Ok(())
    } else {
        Err(ProbeFailure::Assertion(message()))
    }
}

/// Fail unless `actual == expected`.
pub fn ensure_eq<T>(what: &str, actual: &T, expected: &T) -> Result<(), ProbeFailure>
where
    T: PartialEq + Debug + ?Sized,
{
    ensure(actual == expected, || {
        format!("{what}: expected {expected:?}, got {actual:?}")
    })
}

/// Fail unless two buffers are identical.
pub fn ensure_bytes_equal(actual: &[u8], expected: &[u8], context: &str) -> Result<(), ProbeFailure> {
    if actual.len() != expected.len() {
        return Err(ProbeFailure::Assertion(format!(
            "{context}: size mismatch - expected {} bytes, got {} bytes",
            expected.len(),
            actual.len()
        )));
    }
    match actual.iter().zip(expected).position(|(a, e)| a != e) {
        None => Ok(()),
        Some(i) => Err(ProbeFailure::Assertion(format!(
            "{context}: content mismatch at byte {i} - expected 0x{:02x}, got 0x{:02x}",
            expected[i], actual[i]
        ))),
    }
}

/// Fail unless `path` exists.
pub fn ensure_exists(path: &Path) -> Result<(), ProbeFailure> {
    ensure(fsops::exists(path), || {
        format!("{} should exist", path.display())
    })
}

/// Fail if `path` exists.
pub fn ensure_absent(path: &Path) -> Result<(), ProbeFailure> {
    ensure(!fsops::exists(path), || {
        format!("{} should not exist", path.display())
    })
}
