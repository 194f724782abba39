//! OS-specific file APIs used by the probes.
//!
//! - Delete-on-close creation: native flag on Windows; on Unix the name is
//!   unlinked while the handle is open, which gives the same observable
//!   result (the file is gone once the last handle closes).
//! - Volume information: `GetVolumeInformationW` on Windows; `statvfs` plus
//!   the mount table on Unix.
//! - Space information: `fs2` everywhere.

use std::fs::File;
use std::io;
use std::path::Path;

use serde::Serialize;

#[cfg(target_os = "linux")]
mod mount_table;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as imp;
#[cfg(windows)]
use windows as imp;

/// Metadata reported for a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    /// Volume label; Unix filesystems have none.
    pub label: Option<String>,
    /// Filesystem type name.
    pub filesystem: String,
    /// Longest allowed path component, in characters.
    pub max_component_length: u64,
    /// Volume serial number. Derived from the filesystem id on Unix.
    pub serial: Option<u32>,
}

/// Capacity figures for a mounted volume, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceInfo {
    /// Total size.
    pub capacity: u64,
    /// Free bytes, including any reserved for privileged users.
    pub free: u64,
    /// Free bytes available to this process.
    pub available: u64,
}

/// Create a new file that disappears when the returned handle is closed.
pub fn create_delete_on_close(path: &Path) -> io::Result<File> {
    imp::create_delete_on_close(path)
}

/// Close a file and report the OS result, which `drop` would swallow.
pub fn close(file: File) -> io::Result<()> {
    imp::close(file)
}

/// Query metadata of the volume mounted at `root`.
pub fn volume_information(root: &Path) -> io::Result<VolumeInfo> {
    imp::volume_information(root)
}

/// Query capacity of the volume mounted at `root`.
pub fn space_information(root: &Path) -> io::Result<SpaceInfo> {
    Ok(SpaceInfo {
        capacity: fs2::total_space(root)?,
        free: fs2::free_space(root)?,
        available: fs2::available_space(root)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn delete_on_close_file_is_gone_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc");

        let mut file = create_delete_on_close(&path).unwrap();
        file.write_all(b"abcdef").unwrap();
        close(file).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn delete_on_close_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc");
        std::fs::write(&path, b"keep").unwrap();

        assert!(create_delete_on_close(&path).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn space_information_is_populated() {
        let dir = tempfile::tempdir().unwrap();
        let space = space_information(dir.path()).unwrap();
        assert!(space.capacity > 0);
        assert!(space.free <= space.capacity);
        assert!(space.available <= space.free);
    }

    #[test]
    fn volume_information_reports_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let info = volume_information(dir.path()).unwrap();
        assert!(!info.filesystem.is_empty());
        assert!(info.max_component_length > 0);
    }
}
