//! Acquires the disk image as a contiguous mutable byte region.
//!
//! Grounded on `utils/src/disk.rs`'s raw-`libc`-call idiom (open a
//! `File`, make an unsafe syscall, check the return against 0, fall back
//! to `Error::last_os_error()`), applied here to `mmap`/`munmap` instead
//! of `ioctl`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;
use std::slice;

/// A disk image mapped read-write, shared, into this process's address
/// space. All other components operate only through this byte-offset
/// view; no I/O syscalls appear elsewhere in the crate.
pub struct MappedImage {
    _file: File,
    ptr: *mut u8,
    len: usize,
}

// The mapping is exclusively owned by this struct and all accesses go
// through `&`/`&mut` borrows of it, so it is safe to move between threads
// (the `wfs` host serializes access behind a mutex).
unsafe impl Send for MappedImage {}

impl MappedImage {
    /// Opens `path` for read+write and maps its full length.
    ///
    /// Failure to open or map is treated as fatal by callers: the host
    /// process aborts with a reported error.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "disk image is empty",
            ));
        }
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(MappedImage {
            _file: file,
            ptr: ptr as *mut u8,
            len,
        })
    }

    /// The mapped region, as an immutable byte slice.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The mapped region, as a mutable byte slice.
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Total length of the mapped region, in bytes.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MappedImage {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_and_reflects_writes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 4096]).unwrap();
        tmp.flush().unwrap();

        let mut img = MappedImage::open(tmp.path()).unwrap();
        assert_eq!(img.len(), 4096);
        img.as_slice_mut()[0] = 0xAB;
        assert_eq!(img.as_slice()[0], 0xAB);
    }

    #[test]
    fn rejects_empty_image() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(MappedImage::open(tmp.path()).is_err());
    }
}
