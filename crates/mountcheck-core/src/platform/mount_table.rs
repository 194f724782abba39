//! Filesystem type lookup through `/proc/self/mounts`.

use std::path::{Path, PathBuf};

const MOUNT_TABLE: &str = "/proc/self/mounts";

#[derive(Debug, PartialEq, Eq)]
struct MountEntry {
    mountpoint: PathBuf,
    fstype: String,
}

/// Type of the filesystem whose mountpoint is the deepest ancestor of `path`.
pub(super) fn filesystem_type(path: &Path) -> Option<String> {
    let path = path.canonicalize().ok()?;
    let table = std::fs::read_to_string(MOUNT_TABLE).ok()?;
    deepest_mount(&table, &path).map(|entry| entry.fstype)
}

fn deepest_mount(table: &str, path: &Path) -> Option<MountEntry> {
    // Later entries shadow earlier ones on the same mountpoint, so ties go
    // to the last line.
    table
        .lines()
        .filter_map(parse_line)
        .filter(|entry| path.starts_with(&entry.mountpoint))
        .fold(None, |best: Option<MountEntry>, entry| match best {
            Some(b) if b.mountpoint.components().count() > entry.mountpoint.components().count() => {
                Some(b)
            }
            _ => Some(entry),
        })
}

/// `"{source} {mountpoint} {fstype} {options} {dump} {pass}"`
fn parse_line(line: &str) -> Option<MountEntry> {
    let mut fields = line.split_ascii_whitespace();
    let _source = fields.next()?;
    let mountpoint = decode_octal_escapes(fields.next()?);
    let fstype = fields.next()?.to_string();
    Some(MountEntry {
        mountpoint: PathBuf::from(mountpoint),
        fstype,
    })
}

/// The kernel writes space, tab, newline and backslash as `\ooo`.
fn decode_octal_escapes(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(code) = bytes
                .get(i + 1..i + 4)
                .filter(|digits| digits.iter().all(|d| (b'0'..=b'7').contains(d)))
                .map(|digits| digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0')))
            && let Ok(byte) = u8::try_from(code)
        {
            out.push(byte);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
