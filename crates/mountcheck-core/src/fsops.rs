//! Filesystem operations with structured errors.
//!
//! Probes compare failures as values, so every operation here reports a
//! [`FilesystemError`] naming the operation, a classified reason and the
//! absolute path involved. The display form is the single-line
//! `filesystem error: cannot <op>: <reason> [<path>]`.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

/// OS error 19: ENODEV on Unix. On Windows it is ERROR_WRITE_PROTECT, which
/// the C runtime also reports as ENODEV.
const OS_ERROR_NO_SUCH_DEVICE: i32 = 19;

/// The operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsOperation {
    /// Create a file.
    Create,
    /// Open an existing file.
    Open,
    /// Read file contents.
    Read,
    /// Write file contents.
    Write,
    /// Close a handle.
    Close,
    /// Remove a file or empty directory.
    Remove,
    /// Remove a directory tree.
    RemoveAll,
    /// Create a directory.
    CreateDirectory,
    /// Copy a file.
    Copy,
    /// List a directory.
    ReadDirectory,
    /// Query volume metadata.
    VolumeInformation,
    /// Query free space.
    Space,
}

impl fmt::Display for FsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Close => "close",
            Self::Remove => "remove",
            Self::RemoveAll => "remove all",
            Self::CreateDirectory => "create directory",
            Self::Copy => "copy",
            Self::ReadDirectory => "read directory",
            Self::VolumeInformation => "get volume information",
            Self::Space => "get space",
        };
        f.write_str(name)
    }
}

/// Classified reason for a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsErrorKind {
    /// OS error 19.
    NoSuchDevice,
    /// EROFS and friends.
    ReadOnlyFilesystem,
    /// Access denied.
    PermissionDenied,
    /// Path does not exist.
    NotFound,
    /// Path already exists.
    AlreadyExists,
    /// Directory still has entries.
    DirectoryNotEmpty,
    /// Anything else, with the OS message.
    Other(String),
}

impl FsErrorKind {
    /// Classify an I/O error.
    pub fn from_io(err: &io::Error) -> Self {
        if err.raw_os_error() == Some(OS_ERROR_NO_SUCH_DEVICE) {
            return Self::NoSuchDevice;
        }
        match err.kind() {
            ErrorKind::ReadOnlyFilesystem => Self::ReadOnlyFilesystem,
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::AlreadyExists => Self::AlreadyExists,
            ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty,
            _ => Self::Other(strip_os_code(&err.to_string())),
        }
    }
}

/// `"Broken pipe (os error 32)"` -> `"Broken pipe"`.
fn strip_os_code(message: &str) -> String {
    match message.rfind(" (os error ") {
        Some(idx) if message.ends_with(')') => message[..idx].to_string(),
        _ => message.to_string(),
    }
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchDevice => f.write_str("No such device"),
            Self::ReadOnlyFilesystem => f.write_str("Read-only file system"),
            Self::PermissionDenied => f.write_str("Permission denied"),
            Self::NotFound => f.write_str("No such file or directory"),
            Self::AlreadyExists => f.write_str("File exists"),
            Self::DirectoryNotEmpty => f.write_str("Directory not empty"),
            Self::Other(message) => f.write_str(message),
        }
    }
}

/// A failed filesystem operation, compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("filesystem error: cannot {op}: {kind} [{}]", .path.display())]
pub struct FilesystemError {
    /// What was attempted.
    pub op: FsOperation,
    /// Why it failed.
    pub kind: FsErrorKind,
    /// Absolute path it was attempted on.
    pub path: PathBuf,
}

impl FilesystemError {
    /// Build an error; `path` is made absolute.
    pub fn new(op: FsOperation, kind: FsErrorKind, path: &Path) -> Self {
        Self {
            op,
            kind,
            path: absolute(path),
        }
    }

    /// Build an error from an I/O failure.
    pub fn from_io(op: FsOperation, path: &Path, err: &io::Error) -> Self {
        Self::new(op, FsErrorKind::from_io(err), path)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn wrap<T>(op: FsOperation, path: &Path, result: io::Result<T>) -> Result<T, FilesystemError> {
    result.map_err(|e| {
        trace!(%op, path = %path.display(), error = %e, "Filesystem operation failed");
        FilesystemError::from_io(op, path, &e)
    })
}

/// Create a new file; fails if it exists.
pub fn create_new(path: &Path) -> Result<File, FilesystemError> {
    wrap(
        FsOperation::Create,
        path,
        OpenOptions::new().write(true).create_new(true).open(path),
    )
}

/// Issue a single write of `data` and flush, returning the byte count the
/// OS reported. A short write is returned as-is for the caller to judge.
pub fn write_counted<W: Write>(writer: &mut W, path: &Path, data: &[u8]) -> Result<usize, FilesystemError> {
    let written = loop {
        match writer.write(data) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(FilesystemError::from_io(FsOperation::Write, path, &e)),
        }
    };
    wrap(FsOperation::Write, path, writer.flush())?;
    Ok(written)
}

/// Create `path`, write `data`, flush and close. Returns bytes written.
pub fn write_new(path: &Path, data: &[u8]) -> Result<usize, FilesystemError> {
    let mut file = create_new(path)?;
    let written = write_counted(&mut file, path, data)?;
    wrap(FsOperation::Write, path, file.sync_all())?;
    crate::platform::close(file).map_err(|e| FilesystemError::from_io(FsOperation::Close, path, &e))?;
    Ok(written)
}

/// Read a whole file.
pub fn read_file(path: &Path) -> Result<Vec<u8>, FilesystemError> {
    let mut file = wrap(FsOperation::Open, path, File::open(path))?;
    let mut buf = Vec::new();
    wrap(FsOperation::Read, path, file.read_to_end(&mut buf))?;
    Ok(buf)
}

/// Remove a file.
pub fn remove_file(path: &Path) -> Result<(), FilesystemError> {
    wrap(FsOperation::Remove, path, fs::remove_file(path))
}

/// Remove an empty directory.
pub fn remove_dir(path: &Path) -> Result<(), FilesystemError> {
    wrap(FsOperation::Remove, path, fs::remove_dir(path))
}

/// Create a single directory.
pub fn create_dir(path: &Path) -> Result<(), FilesystemError> {
    wrap(FsOperation::CreateDirectory, path, fs::create_dir(path))
}

/// Copy a file, returning the number of bytes copied.
pub fn copy(from: &Path, to: &Path) -> Result<u64, FilesystemError> {
    wrap(FsOperation::Copy, from, fs::copy(from, to))
}

/// Whether `path` exists. Errors other than "not found" count as existing,
/// so a probe asserting absence never passes on an unreadable path.
pub fn exists(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != ErrorKind::NotFound,
    }
}

/// Remove a directory tree, returning how many entries were removed
/// (the root included).
pub fn remove_all(path: &Path) -> Result<u64, FilesystemError> {
    let mut removed = 0;
    for entry in WalkDir::new(path).contents_first(true) {
        let entry = entry.map_err(|e| walk_error(FsOperation::RemoveAll, path, e))?;
        let result = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        wrap(FsOperation::RemoveAll, entry.path(), result)?;
        removed += 1;
    }
    Ok(removed)
}

/// Every path below `root`, excluding `root` itself.
pub fn list_recursive(root: &Path) -> Result<BTreeSet<PathBuf>, FilesystemError> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            entry
                .map(walkdir::DirEntry::into_path)
                .map_err(|e| walk_error(FsOperation::ReadDirectory, root, e))
        })
        .collect()
}

fn walk_error(op: FsOperation, root: &Path, err: walkdir::Error) -> FilesystemError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(io_err) => FilesystemError::from_io(op, &path, &io_err),
        None => FilesystemError::new(
            op,
            FsErrorKind::Other("filesystem loop detected".to_string()),
            &path,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_such_device_display_matches_template() {
        let err = FilesystemError::new(
            FsOperation::Remove,
            FsErrorKind::NoSuchDevice,
            Path::new("/mnt/z/test_file"),
        );
        assert_eq!(
            err.to_string(),
            "filesystem error: cannot remove: No such device [/mnt/z/test_file]"
        );
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let err = FilesystemError::new(FsOperation::Create, FsErrorKind::NotFound, Path::new("rel"));
        assert!(err.path.is_absolute());
        assert!(err.path.ends_with("rel"));
    }

    #[test]
    fn os_error_19_is_no_such_device() {
        let err = io::Error::from_raw_os_error(19);
        assert_eq!(FsErrorKind::from_io(&err), FsErrorKind::NoSuchDevice);
    }

    #[test]
    fn other_errors_drop_os_code() {
        let err = io::Error::other("weird");
        assert_eq!(FsErrorKind::from_io(&err), FsErrorKind::Other("weird".into()));
        assert_eq!(strip_os_code("Broken pipe (os error 32)"), "Broken pipe");
    }

    #[test]
    fn create_new_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        write_new(&path, b"x").unwrap();

        let err = create_new(&path).unwrap_err();
        assert_eq!(err.op, FsOperation::Create);
        assert_eq!(err.kind, FsErrorKind::AlreadyExists);
    }

    #[test]
    fn write_new_reports_bytes_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        assert_eq!(write_new(&path, b"abcdef").unwrap(), 6);
        assert_eq!(read_file(&path).unwrap(), b"abcdef");
    }

    /// Accepts at most `limit` bytes per write.
    struct ShortWriter {
        limit: usize,
        accepted: Vec<u8>,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_count_is_reported() {
        let mut writer = ShortWriter {
            limit: 4,
            accepted: Vec::new(),
        };
        let written = write_counted(&mut writer, Path::new("/mnt/x/f"), b"abcdef").unwrap();
        assert_eq!(written, 4);
        assert_eq!(writer.accepted, b"abcd");
    }

    #[test]
    fn write_counted_issues_one_write() {
        let mut writer = ShortWriter {
            limit: usize::MAX,
            accepted: Vec::new(),
        };
        assert_eq!(write_counted(&mut writer, Path::new("/mnt/x/f"), b"abcdef").unwrap(), 6);
        assert_eq!(writer.accepted, b"abcdef");
    }

    #[test]
    fn remove_dir_refuses_non_empty_directory() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base");
        create_dir(&base).unwrap();
        write_new(&base.join("f"), b"x").unwrap();

        let err = remove_dir(&base).unwrap_err();
        assert_eq!(err.op, FsOperation::Remove);
        assert_eq!(err.kind, FsErrorKind::DirectoryNotEmpty);
        assert!(exists(&base));
    }

    #[test]
    fn remove_all_counts_every_entry() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base");
        create_dir(&base).unwrap();
        create_dir(&base.join("sub")).unwrap();
        write_new(&base.join("a"), b"a").unwrap();
        write_new(&base.join("sub").join("b"), b"b").unwrap();

        assert_eq!(remove_all(&base).unwrap(), 4);
        assert!(!exists(&base));
    }

    #[test]
    fn list_recursive_excludes_root() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        create_dir(&base.join("sub")).unwrap();
        write_new(&base.join("a"), b"a").unwrap();
        write_new(&base.join("sub").join("b"), b"b").unwrap();

        let expected: BTreeSet<PathBuf> = [
            base.join("sub"),
            base.join("a"),
            base.join("sub").join("b"),
        ]
        .into_iter()
        .collect();
        assert_eq!(list_recursive(base).unwrap(), expected);
    }

    #[test]
    fn missing_file_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing");
        let err = read_file(&path).unwrap_err();
        assert_eq!(err.op, FsOperation::Open);
        assert_eq!(err.kind, FsErrorKind::NotFound);
        assert_eq!(err.path, path);
    }

    #[test]
    fn copy_preserves_content() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write_new(&src, b"payload").unwrap();
        assert_eq!(copy(&src, &dst).unwrap(), 7);
        assert_eq!(read_file(&dst).unwrap(), b"payload");
    }
}
