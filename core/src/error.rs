//! The error taxonomy shared by every fallible operation in this crate.

use std::fmt;
use std::io;

/// A failure returned by an operation in [`crate::ops`] or one of the
/// lower-level engines it is built from.
///
/// Variant names are abstract (they do not name a host ABI); [`WfsError::errno`]
/// maps each one to the POSIX errno a FUSE host should reply with.
#[derive(Debug)]
pub enum WfsError {
    /// A path component does not exist.
    NotFound,
    /// A non-final path component is not a directory.
    NotADirectory,
    /// The operation refuses to act on a directory.
    IsADirectory,
    /// The create target already exists.
    AlreadyExists,
    /// `rmdir` on a directory that still has entries.
    NotEmpty,
    /// The inode or block allocator is exhausted.
    NoSpace,
    /// A transient allocation failure while handling the request.
    OutOfMemory,
    /// An on-disk invariant was violated (e.g. a block pointer outside
    /// the data region).
    CorruptImage,
    /// The operation targets the root directory, which may never be
    /// removed; real kernels use `EBUSY` for this "can't remove this" case.
    Busy,
    /// A syscall backing the image mapping failed.
    Io(io::Error),
}

impl WfsError {
    /// The POSIX errno a host should surface for this error.
    pub fn errno(&self) -> i32 {
        match self {
            WfsError::NotFound => libc::ENOENT,
            WfsError::NotADirectory => libc::ENOTDIR,
            WfsError::IsADirectory => libc::EISDIR,
            WfsError::AlreadyExists => libc::EEXIST,
            WfsError::NotEmpty => libc::ENOTEMPTY,
            WfsError::NoSpace => libc::ENOSPC,
            WfsError::OutOfMemory => libc::ENOMEM,
            WfsError::CorruptImage => libc::EIO,
            WfsError::Busy => libc::EBUSY,
            WfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl fmt::Display for WfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WfsError::NotFound => write!(f, "no such file or directory"),
            WfsError::NotADirectory => write!(f, "not a directory"),
            WfsError::IsADirectory => write!(f, "is a directory"),
            WfsError::AlreadyExists => write!(f, "file exists"),
            WfsError::NotEmpty => write!(f, "directory not empty"),
            WfsError::NoSpace => write!(f, "no space left on device"),
            WfsError::OutOfMemory => write!(f, "out of memory"),
            WfsError::CorruptImage => write!(f, "corrupt image: invariant violation"),
            WfsError::Busy => write!(f, "refusing to remove the root directory"),
            WfsError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WfsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WfsError {
    fn from(e: io::Error) -> Self {
        WfsError::Io(e)
    }
}

/// Shorthand used throughout this crate.
pub type Result<T> = std::result::Result<T, WfsError>;
