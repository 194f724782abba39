use super::{Probe, ProbeContext, ProbeFailure};

/// Named slot for a behavior with no check yet. Runs as a no-op and is
/// reported as reserved.
#[derive(Debug, Clone, Copy)]
pub struct ReservedProbe {
    name: &'static str,
    description: &'static str,
}

impl ReservedProbe {
    /// File timestamps.
    pub const FILE_TIMES: Self = Self {
        name: "file_times",
        description: "Creation, access and write timestamps (reserved)",
    };

    /// Security descriptors and permissions.
    pub const FILE_SECURITY: Self = Self {
        name: "file_security",
        description: "File security descriptors (reserved)",
    };

    /// Allocation size versus end-of-file.
    pub const ALLOCATION_SIZE: Self = Self {
        name: "allocation_size",
        description: "Allocation size and end-of-file handling (reserved)",
    };
}

impl Probe for ReservedProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn is_reserved(&self) -> bool {
        true
    }

    fn run(&self, _ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        Ok(())
    }
}
