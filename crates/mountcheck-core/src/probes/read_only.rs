//! Read-only mounts reject writes and leave existing files alone.

use std::path::Path;

use tracing::debug;

use super::{Probe, ProbeContext, ProbeFailure, ensure_absent, ensure_bytes_equal, ensure_eq, ensure_exists};
use crate::driver::MountSpec;
use crate::fsops::{self, FilesystemError, FsErrorKind, FsOperation};

const CONTENT: &[u8] = b"written before the read-only remount";

/// Write a file, remount read-only, check that nothing can change, remount
/// writable and clean up.
pub struct ReadOnlyEnforcement;

impl Probe for ReadOnlyEnforcement {
    fn name(&self) -> &'static str {
        "read_only_enforcement"
    }

    fn description(&self) -> &'static str {
        "Read-only mount rejects create and remove, existing content is intact"
    }

    fn alternate_mountpoints(&self) -> usize {
        1
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let mountpoint = ctx.alternate(0)?;

        let root = ctx.map(MountSpec::new(&mountpoint))?;
        let existing = root.join(ProbeContext::unique_name("test_ro"));
        fsops::write_new(&existing, CONTENT)?;
        ctx.unmap(&mountpoint)?;

        let root = ctx.map(MountSpec::new(&mountpoint).read_only(true))?;
        let rejected = root.join(ProbeContext::unique_name("test_ro_new"));
        match fsops::create_new(&rejected) {
            Ok(file) => {
                drop(file);
                return Err(ProbeFailure::assertion(format!(
                    "creating {} succeeded on a read-only mount",
                    rejected.display()
                )));
            }
            Err(err) => debug!(%err, "Create rejected as expected"),
        }
        ensure_absent(&rejected)?;

        ensure_exists(&existing)?;
        ensure_bytes_equal(&fsops::read_file(&existing)?, CONTENT, "read-only mount")?;

        check_remove_rejected(
            fsops::remove_file(&existing),
            &existing,
            &ctx.config().read_only.remove_error,
        )?;
        ctx.unmap(&mountpoint)?;

        ctx.map(MountSpec::new(&mountpoint))?;
        ensure_exists(&existing)?;
        fsops::remove_file(&existing)?;
        ensure_absent(&existing)?;
        ctx.unmap(&mountpoint)
    }
}

/// A remove on a read-only mount must fail with exactly `expected`.
fn check_remove_rejected(
    result: Result<(), FilesystemError>,
    path: &Path,
    expected: &FsErrorKind,
) -> Result<(), ProbeFailure> {
    match result {
        Ok(()) => Err(ProbeFailure::assertion(format!(
            "removing {} succeeded on a read-only mount",
            path.display()
        ))),
        Err(err) => {
            let expected = FilesystemError::new(FsOperation::Remove, expected.clone(), path);
            ensure_eq("read-only remove error", &err, &expected)
        }
    }
}
