use super::{Probe, ProbeContext, ProbeFailure, ensure_absent, ensure_bytes_equal, ensure_exists};
use crate::driver::MountSpec;
use crate::fsops;

const PAYLOAD: &[u8] = b"abcdef";

/// A file written through one mountpoint is visible through another mount
/// of the same store.
pub struct CrossMountPersistence;

impl Probe for CrossMountPersistence {
    fn name(&self) -> &'static str {
        "cross_mount_persistence"
    }

    fn description(&self) -> &'static str {
        "File written through one mount reads back through a second mount"
    }

    fn alternate_mountpoints(&self) -> usize {
        2
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let first = ctx.alternate(0)?;
        let second = ctx.alternate(1)?;
        let name = ProbeContext::unique_name("test_persist");

        let root = ctx.map(MountSpec::new(&first))?;
        fsops::write_new(&root.join(&name), PAYLOAD)?;
        ctx.unmap(&first)?;

        let root = ctx.map(MountSpec::new(&second))?;
        let file = root.join(&name);
        ensure_exists(&file)?;
        ensure_bytes_equal(&fsops::read_file(&file)?, PAYLOAD, "second mount")?;
        fsops::remove_file(&file)?;
        ensure_absent(&file)?;
        ctx.unmap(&second)
    }
}
