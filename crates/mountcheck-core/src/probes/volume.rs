//! Volume metadata and capacity probes.

use tracing::debug;

use super::{Probe, ProbeContext, ProbeFailure, ensure, ensure_eq};
use crate::config::VolumeExpectation;
use crate::driver::MountSpec;
use crate::fsops::{FilesystemError, FsOperation};
use crate::platform::{self, VolumeInfo};

/// Label, filesystem name, component length and serial match what the
/// mount was asked for.
pub struct VolumeInformation;

impl Probe for VolumeInformation {
    fn name(&self) -> &'static str {
        "volume_information"
    }

    fn description(&self) -> &'static str {
        "Volume label, filesystem name, name length limit and serial match the mount options (labels are only reported on Windows)"
    }

    fn alternate_mountpoints(&self) -> usize {
        1
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let mountpoint = ctx.alternate(0)?;
        let expected = ctx.config().volume.clone();

        let root = ctx.map(
            MountSpec::new(&mountpoint)
                .volume_name(&expected.name)
                .volume_serial(expected.serial),
        )?;
        let info = platform::volume_information(&root)
            .map_err(|e| FilesystemError::from_io(FsOperation::VolumeInformation, &root, &e))?;
        debug!(?info, "Volume information");

        check_volume(&info, &expected)?;
        ctx.unmap(&mountpoint)
    }
}

/// Compare reported volume metadata against the mount options.
fn check_volume(info: &VolumeInfo, expected: &VolumeExpectation) -> Result<(), ProbeFailure> {
    let Some(label) = info.label.as_deref() else {
        return Err(ProbeFailure::assertion(
            "volume label is not observable on this platform",
        ));
    };
    ensure_eq("volume label", label, expected.name.as_str())?;
    ensure_eq("filesystem name", &info.filesystem, &expected.filesystem)?;
    ensure_eq(
        "max component length",
        &info.max_component_length,
        &expected.max_component_length,
    )?;
    ensure_eq("volume serial", &info.serial, &Some(expected.serial))
}

/// Capacity figures of the shared mount are all non-zero.
pub struct FreeSpace;

impl Probe for FreeSpace {
    fn name(&self) -> &'static str {
        "free_space"
    }

    fn description(&self) -> &'static str {
        "Capacity, free and available bytes are reported and non-zero"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let root = ctx.root();
        let space = platform::space_information(root)
            .map_err(|e| FilesystemError::from_io(FsOperation::Space, root, &e))?;
        debug!(?space, "Space information");

        ensure(space.capacity > 0, || "capacity is zero".to_string())?;
        ensure(space.free > 0, || "free space is zero".to_string())?;
        ensure(space.available > 0, || "available space is zero".to_string())
    }
}
