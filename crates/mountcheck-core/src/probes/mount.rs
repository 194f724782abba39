use super::{Probe, ProbeContext, ProbeFailure, ensure_exists};
use crate::driver::MountSpec;

/// Map an alternate mountpoint and unmap it again.
pub struct MountCycle;

impl Probe for MountCycle {
    fn name(&self) -> &'static str {
        "mount_cycle"
    }

    fn description(&self) -> &'static str {
        "An alternate mountpoint maps, becomes ready and unmaps cleanly"
    }

    fn alternate_mountpoints(&self) -> usize {
        1
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let mountpoint = ctx.alternate(0)?;
        let root = ctx.map(MountSpec::new(&mountpoint))?;
        ensure_exists(&root)?;
        ctx.unmap(&mountpoint)
    }
}
