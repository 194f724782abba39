//! Directory creation, removal and enumeration probes.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::{Probe, ProbeContext, ProbeFailure, ensure, ensure_absent, ensure_eq, ensure_exists};
use crate::fsops;

/// Nested directories with a file in each; removal semantics.
pub struct DirectoryHierarchy;

impl Probe for DirectoryHierarchy {
    fn name(&self) -> &'static str {
        "directory_hierarchy"
    }

    fn description(&self) -> &'static str {
        "Non-empty directories resist plain removal, recursive removal counts entries"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let base = ctx.unique_path("test_dir");
        let nested = base.join("nested");
        let top_file = base.join("top.txt");
        let nested_file = nested.join("nested.txt");

        fsops::create_dir(&base)?;
        fsops::create_dir(&nested)?;
        fsops::write_new(&top_file, b"top")?;
        fsops::write_new(&nested_file, b"nested")?;
        ensure_exists(&top_file)?;
        ensure_exists(&nested_file)?;

        if fsops::remove_dir(&base).is_ok() {
            return Err(ProbeFailure::assertion(format!(
                "removing non-empty directory {} succeeded",
                base.display()
            )));
        }
        ensure_exists(&base)?;

        fsops::remove_file(&nested_file)?;
        fsops::remove_dir(&nested)?;
        ensure_absent(&nested)?;

        // What is left: the base directory and top.txt.
        let removed = fsops::remove_all(&base)?;
        ensure(removed > 0, || {
            format!("recursive removal of {} reported nothing removed", base.display())
        })?;
        if removed != 2 {
            warn!(removed, expected = 2, "Recursive removal count differs");
        }
        ensure_absent(&base)
    }
}

/// Recursive listing returns exactly what was created.
pub struct RecursiveEnumeration;

impl Probe for RecursiveEnumeration {
    fn name(&self) -> &'static str {
        "recursive_enumeration"
    }

    fn description(&self) -> &'static str {
        "Recursive listing yields exactly the subdirectory and both files"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let base = ctx.unique_path("test_enum");
        let sub = base.join("sub");
        let top_file = base.join("a.txt");
        let nested_file = sub.join("b.txt");

        fsops::create_dir(&base)?;
        fsops::create_dir(&sub)?;
        fsops::write_new(&top_file, b"a")?;
        fsops::write_new(&nested_file, b"b")?;

        let listed = fsops::list_recursive(&base)?;
        let expected: BTreeSet<PathBuf> = [sub, top_file, nested_file].into_iter().collect();
        ensure_eq("recursive listing", &listed, &expected)?;

        let removed = fsops::remove_all(&base)?;
        debug!(removed, "Enumeration fixtures removed");
        Ok(())
    }
}
