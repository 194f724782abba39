use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::IntoRawFd;
use std::path::Path;

use nix::sys::statvfs::statvfs;
use tracing::debug;

use super::VolumeInfo;

pub(super) fn create_delete_on_close(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;
    // The inode lives on until the last descriptor is closed.
    if let Err(e) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Unlink after create failed, file left in place");
        return Err(e);
    }
    Ok(file)
}

pub(super) fn close(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: `into_raw_fd` transferred ownership of a valid descriptor to us
    // and it is closed exactly once here.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub(super) fn volume_information(root: &Path) -> io::Result<VolumeInfo> {
    let stat = statvfs(root).map_err(io::Error::from)?;
    let filesystem = filesystem_type(root).unwrap_or_else(|| {
        debug!(root = %root.display(), "Filesystem type not found, reporting unknown");
        "unknown".to_string()
    });

    // Fold the 64-bit filesystem id into the 32 bits a volume serial has.
    let fsid = u64::from(stat.filesystem_id());
    #[allow(clippy::cast_possible_truncation)]
    let serial = (fsid ^ (fsid >> 32)) as u32;

    Ok(VolumeInfo {
        label: None,
        filesystem,
        max_component_length: u64::from(stat.name_max()),
        serial: Some(serial),
    })
}

#[cfg(target_os = "linux")]
fn filesystem_type(root: &Path) -> Option<String> {
    super::mount_table::filesystem_type(root)
}

#[cfg(target_os = "macos")]
fn filesystem_type(root: &Path) -> Option<String> {
    nix::sys::statfs::statfs(root)
        .ok()
        .map(|stat| stat.filesystem_type_name().to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn filesystem_type(_root: &Path) -> Option<String> {
    None
}
