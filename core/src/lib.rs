//! The on-disk engine: mapping, allocation, inode and directory
//! management, path resolution, and the operation surface a host drives.
//!
//! Nothing in this crate depends on a particular host (FUSE, a CLI, a
//! test harness); `wfs` and `mkfs` are the two binaries built on top of it.

pub mod bitmap;
pub mod block;
pub mod dir;
pub mod error;
pub mod inode;
pub mod layout;
pub mod mapping;
pub mod mount;
pub mod ops;
pub mod path;

pub use error::{Result, WfsError};
pub use mount::Mount;
pub use ops::Stat;
