use std::fs::{File, OpenOptions};
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::IntoRawHandle;
use std::path::Path;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Storage::FileSystem::{FILE_FLAG_DELETE_ON_CLOSE, GetVolumeInformationW};

use super::VolumeInfo;

/// MAX_PATH plus the terminator.
const NAME_BUFFER_LEN: usize = 261;

pub(super) fn create_delete_on_close(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .share_mode(0)
        .custom_flags(FILE_FLAG_DELETE_ON_CLOSE)
        .open(path)
}

pub(super) fn close(file: File) -> io::Result<()> {
    let handle = file.into_raw_handle();
    // SAFETY: `into_raw_handle` transferred ownership of a valid handle to us
    // and it is closed exactly once here.
    if unsafe { CloseHandle(handle) } != 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub(super) fn volume_information(root: &Path) -> io::Result<VolumeInfo> {
    let root_wide: Vec<u16> = root
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let mut label = [0u16; NAME_BUFFER_LEN];
    let mut fs_name = [0u16; NAME_BUFFER_LEN];
    let mut serial = 0u32;
    let mut max_component = 0u32;
    let mut flags = 0u32;

    #[allow(clippy::cast_possible_truncation)]
    let buffer_len = NAME_BUFFER_LEN as u32;
    // SAFETY: every pointer refers to a live local buffer of the stated
    // length, and the root path is NUL-terminated.
    let ok = unsafe {
        GetVolumeInformationW(
            root_wide.as_ptr(),
            label.as_mut_ptr(),
            buffer_len,
            &raw mut serial,
            &raw mut max_component,
            &raw mut flags,
            fs_name.as_mut_ptr(),
            buffer_len,
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(VolumeInfo {
        label: Some(from_wide(&label)),
        filesystem: from_wide(&fs_name),
        max_component_length: u64::from(max_component),
        serial: Some(serial),
    })
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
