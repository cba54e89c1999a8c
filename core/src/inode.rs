//! Inode lifecycle: allocating a fresh slot and retiring one.
//!
//! `Mount::inode`/`Mount::inode_mut` already provide the typed-view half
//! of inode access; this module provides the other half (`new_inode`,
//! `delete_inode`).

use crate::error::{Result, WfsError};
use crate::layout::{self, Inode};
use crate::mount::Mount;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, for inode timestamps.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Allocates a free inode slot, zeroes it, and stamps `num`, `mode`,
/// owner, `nlinks` (2 for a directory, 1 otherwise), all timestamps to
/// now, and all block entries to 0.
///
/// Returns [`WfsError::NoSpace`] if the inode allocator is exhausted.
pub fn new_inode(mount: &mut Mount, mode: u32, uid: u32, gid: u32) -> Result<u64> {
    let n = mount
        .inode_bitmap_mut()
        .allocate()
        .ok_or(WfsError::NoSpace)?;
    let t = now();
    let slot = mount.inode_mut(n);
    *slot = Inode::zeroed();
    slot.num = n as u32;
    slot.mode = mode;
    slot.uid = uid;
    slot.gid = gid;
    slot.nlinks = if layout::is_dir(mode) { 2 } else { 1 };
    slot.atim = t;
    slot.mtim = t;
    slot.ctim = t;
    Ok(n)
}

/// Clears the inode-bitmap bit for slot `n`. The caller must already have
/// released every block the inode referenced.
pub fn delete_inode(mount: &mut Mount, n: u64) {
    mount.inode_bitmap_mut().free(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::tests_support::fresh_mount;

    #[test]
    fn new_inode_stamps_defaults() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 1000, 1000).unwrap();
        assert_ne!(n, 0); // root already occupies slot 0
        let ino = mount.inode(n);
        assert_eq!(ino.num, n as u32);
        assert_eq!(ino.nlinks, 1);
        assert_eq!(ino.size, 0);
        assert!(ino.blocks.iter().all(|&b| b == 0));
    }

    #[test]
    fn new_directory_gets_two_links() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let n = new_inode(&mut mount, layout::S_IFDIR | 0o755, 0, 0).unwrap();
        assert_eq!(mount.inode(n).nlinks, 2);
    }

    #[test]
    fn delete_inode_frees_bitmap_bit() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).unwrap();
        assert!(mount.inode_bitmap_mut().is_set(n));
        delete_inode(&mut mount, n);
        assert!(!mount.inode_bitmap_mut().is_set(n));
    }

    #[test]
    fn exhaustion_returns_nospace() {
        let (_tmp, mut mount) = fresh_mount(2, 32);
        // slot 0 is root; one slot remains.
        assert!(new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).is_ok());
        match new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0) {
            Err(WfsError::NoSpace) => {}
            other => panic!("expected NoSpace, got {other:?}"),
        }
    }
}
