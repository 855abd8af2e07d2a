//! Opening target files and reading them in full blocks.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;

use crate::config::IoMode;

/// Alignment for read buffers. `O_DIRECT` requires buffer and length
/// alignment to the logical sector size; 4096 covers both 512-byte and
/// 4096-byte sectors. Block sizes are whole MiB, so length alignment holds.
const DIRECT_IO_ALIGN: usize = 4096;

/// Heap buffer with `DIRECT_IO_ALIGN` alignment.
pub(crate) struct AlignedBuf {
    ptr: std::ptr::NonNull<u8>,
    layout: std::alloc::Layout,
}

impl AlignedBuf {
    pub(crate) fn new(size: usize) -> Self {
        let layout = std::alloc::Layout::from_size_align(size, DIRECT_IO_ALIGN)
            .expect("block size fits in a Layout");
        let ptr = unsafe { std::alloc::alloc(layout) };
        let ptr =
            std::ptr::NonNull::new(ptr).unwrap_or_else(|| std::alloc::handle_alloc_error(layout));
        AlignedBuf { ptr, layout }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

// Sole owner of the allocation; moved into the worker that fills it.
unsafe impl Send for AlignedBuf {}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

pub(crate) fn open_target(path: &Path, io_mode: IoMode) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::prelude::OpenOptionsExt;
        if io_mode.is_direct() {
            options.custom_flags(libc::O_DIRECT);
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = io_mode;
    options.open(path)
}

/// Fills `buf` from the file's current position, retrying short transfers
/// until the buffer is full or EOF. Returns the number of bytes read; a
/// value shorter than `buf` means EOF was reached.
pub(crate) fn read_full_block(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn full_blocks_then_partial_then_eof() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[7u8; 1000]).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut buf = [0u8; 400];
        assert_eq!(read_full_block(&mut file, &mut buf).unwrap(), 400);
        assert_eq!(buf, [7u8; 400]);
        assert_eq!(read_full_block(&mut file, &mut buf).unwrap(), 400);
        assert_eq!(read_full_block(&mut file, &mut buf).unwrap(), 200);
        assert_eq!(read_full_block(&mut file, &mut buf).unwrap(), 0);
    }

    #[test]
    fn aligned_buf_is_aligned_and_sized() {
        let mut buf = AlignedBuf::new(1 << 20);
        let slice = buf.as_mut_slice();
        assert_eq!(slice.len(), 1 << 20);
        assert_eq!(slice.as_ptr() as usize % DIRECT_IO_ALIGN, 0);
    }

    #[test]
    fn open_missing_file_fails_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_target(&dir.path().join("nope.bin"), IoMode::Cached).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
