//! File creation, I/O and copy probes on the shared mount.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use super::{Probe, ProbeContext, ProbeFailure, ensure_absent, ensure_bytes_equal, ensure_eq};
use crate::fsops::{self, FilesystemError, FsOperation};
use crate::platform;

const DELETE_ON_CLOSE_PAYLOAD: &[u8] = b"abcdef";

const ROUNDTRIP_PAYLOAD: &[u8] = b"mountcheck round trip\n\x00\x01\x7f\x80\xfe\xff\r\n";

/// Create a delete-on-close file; it must vanish on close.
pub struct CreateDeleteOnClose;

impl Probe for CreateDeleteOnClose {
    fn name(&self) -> &'static str {
        "create_delete_on_close"
    }

    fn description(&self) -> &'static str {
        "Delete-on-close file is gone after its handle closes"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let path = ctx.unique_path("test_create");
        let file = platform::create_delete_on_close(&path)
            .map_err(|e| FilesystemError::from_io(FsOperation::Create, &path, &e))?;
        platform::close(file).map_err(|e| FilesystemError::from_io(FsOperation::Close, &path, &e))?;
        ensure_absent(&path)
    }
}

/// Write to a delete-on-close file; byte count is exact and the file vanishes.
pub struct WriteDeleteOnClose;

impl Probe for WriteDeleteOnClose {
    fn name(&self) -> &'static str {
        "write_delete_on_close"
    }

    fn description(&self) -> &'static str {
        "Write to a delete-on-close file reports every byte, file is gone after close"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let path = ctx.unique_path("test_write");
        let mut file = platform::create_delete_on_close(&path)
            .map_err(|e| FilesystemError::from_io(FsOperation::Create, &path, &e))?;

        write_exactly(&mut file, &path, DELETE_ON_CLOSE_PAYLOAD)?;

        platform::close(file).map_err(|e| FilesystemError::from_io(FsOperation::Close, &path, &e))?;
        ensure_absent(&path)
    }
}

/// One write of `payload`; the reported byte count must equal its length.
fn write_exactly<W: Write>(writer: &mut W, path: &Path, payload: &[u8]) -> Result<(), ProbeFailure> {
    let written = fsops::write_counted(writer, path, payload)?;
    ensure_eq("bytes written", &written, &payload.len())
}

/// Write, close, reopen, compare.
pub struct WriteReadRoundtrip;

impl Probe for WriteReadRoundtrip {
    fn name(&self) -> &'static str {
        "write_read_roundtrip"
    }

    fn description(&self) -> &'static str {
        "Bytes written and flushed read back identically"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let path = ctx.unique_path("test_roundtrip");

        let written = fsops::write_new(&path, ROUNDTRIP_PAYLOAD)?;
        ensure_eq("bytes written", &written, &ROUNDTRIP_PAYLOAD.len())?;

        let content = fsops::read_file(&path)?;
        ensure_bytes_equal(&content, ROUNDTRIP_PAYLOAD, "read back")?;

        fsops::remove_file(&path)?;
        ensure_absent(&path)
    }
}

/// Copy a file into another directory, then delete the source.
pub struct CopyAndDelete;

impl Probe for CopyAndDelete {
    fn name(&self) -> &'static str {
        "copy_and_delete"
    }

    fn description(&self) -> &'static str {
        "Copied file keeps its content after the source is removed"
    }

    fn run(&self, ctx: &mut ProbeContext<'_>) -> Result<(), ProbeFailure> {
        let src_dir = ctx.unique_path("test_copy_src");
        let dst_dir = ctx.unique_path("test_copy_dst");
        fsops::create_dir(&src_dir)?;
        fsops::create_dir(&dst_dir)?;

        let src = src_dir.join("file.bin");
        let dst = dst_dir.join("file.bin");
        fsops::write_new(&src, ROUNDTRIP_PAYLOAD)?;

        let copied = fsops::copy(&src, &dst)?;
        ensure_eq("bytes copied", &copied, &(ROUNDTRIP_PAYLOAD.len() as u64))?;

        fsops::remove_file(&src)?;
        ensure_absent(&src)?;
        ensure_bytes_equal(&fsops::read_file(&dst)?, ROUNDTRIP_PAYLOAD, "copy")?;

        let removed = fsops::remove_all(&src_dir)? + fsops::remove_all(&dst_dir)?;
        debug!(removed, "Copy fixtures removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Truncating(usize);

    impl Write for Truncating {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len().min(self.0))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_fails_byte_count_check() {
        let err = write_exactly(&mut Truncating(4), Path::new("/mnt/x/f"), DELETE_ON_CLOSE_PAYLOAD)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "assertion failed: bytes written: expected 6, got 4"
        );
    }

    #[test]
    fn full_write_passes_byte_count_check() {
        write_exactly(&mut Truncating(usize::MAX), Path::new("/mnt/x/f"), DELETE_ON_CLOSE_PAYLOAD)
            .unwrap();
    }
}
