//! Resolves a logical file-block index to an absolute in-image byte
//! offset, allocating direct and indirect blocks on demand.
//!
//! Offsets (not block indices) are stored directly in the inode and in
//! indirect blocks, so every dereference is a single addition to the
//! image base; the tradeoff is that corrupt offsets are harder to
//! sanity-check, which is why every dereference in this module goes
//! through `Mount::data_block`/`data_block_mut`, which validate the
//! offset lies within the data region first.

use crate::error::{Result, WfsError};
use crate::layout::{D_BLOCK, MAX_LOGICAL_BLOCK};
use crate::mount::Mount;

/// Resolves logical block `k` of inode `inode_num` to an absolute byte
/// offset.
///
/// If `allocate_if_missing` is set and the slot (direct, indirect block,
/// or indirect entry) is unassigned, a fresh zero-filled block is
/// allocated and linked in. Returns:
/// - `Ok(Some(offset))` — the block exists (or was just allocated).
/// - `Ok(None)` — the block is unassigned and `allocate_if_missing` was false.
/// - `Err(WfsError::NoSpace)` — allocation was requested but the data
///   allocator (or the request itself, via `k` exceeding capacity) is exhausted.
pub fn data_block_for(
    mount: &mut Mount,
    inode_num: u64,
    k: u64,
    allocate_if_missing: bool,
) -> Result<Option<u64>> {
    if k > MAX_LOGICAL_BLOCK {
        return if allocate_if_missing {
            Err(WfsError::NoSpace)
        } else {
            Ok(None)
        };
    }

    if k < D_BLOCK as u64 {
        let existing = mount.inode(inode_num).blocks[k as usize];
        if existing != 0 {
            return Ok(Some(existing));
        }
        if !allocate_if_missing {
            return Ok(None);
        }
        let offset = mount.alloc_data_block().ok_or(WfsError::NoSpace)?;
        mount.inode_mut(inode_num).blocks[k as usize] = offset;
        return Ok(Some(offset));
    }

    let j = (k - D_BLOCK as u64) as usize;

    let indirect_off = mount.inode(inode_num).blocks[D_BLOCK];
    let indirect_off = if indirect_off != 0 {
        indirect_off
    } else if allocate_if_missing {
        let offset = match mount.alloc_data_block() {
            Some(o) => o,
            None => return Err(WfsError::NoSpace),
        };
        mount.inode_mut(inode_num).blocks[D_BLOCK] = offset;
        offset
    } else {
        return Ok(None);
    };

    let existing = mount.indirect_entries(indirect_off)?[j];
    if existing != 0 {
        return Ok(Some(existing));
    }
    if !allocate_if_missing {
        return Ok(None);
    }
    let offset = mount.alloc_data_block().ok_or(WfsError::NoSpace)?;
    mount.indirect_entries_mut(indirect_off)?[j] = offset;
    Ok(Some(offset))
}

/// Read-only counterpart of `data_block_for(..., false)`, usable without a
/// `&mut Mount`. `ops::read` is the only caller; it never allocates.
pub fn data_block_for_read(mount: &Mount, inode_num: u64, k: u64) -> Result<Option<u64>> {
    if k > MAX_LOGICAL_BLOCK {
        return Ok(None);
    }
    if k < D_BLOCK as u64 {
        let off = mount.inode(inode_num).blocks[k as usize];
        return Ok(if off == 0 { None } else { Some(off) });
    }
    let j = (k - D_BLOCK as u64) as usize;
    let indirect_off = mount.inode(inode_num).blocks[D_BLOCK];
    if indirect_off == 0 {
        return Ok(None);
    }
    let off = mount.indirect_entries(indirect_off)?[j];
    Ok(if off == 0 { None } else { Some(off) })
}

/// Frees every block referenced by inode `inode_num`: direct blocks, the
/// indirect-pointed blocks, and the indirect block itself. Used by
/// `unlink`/`rmdir` before the inode slot is retired.
pub fn free_all_blocks(mount: &mut Mount, inode_num: u64) {
    let blocks = mount.inode(inode_num).blocks;
    for &off in &blocks[..D_BLOCK] {
        if off != 0 {
            mount.free_data_block(off);
        }
    }
    let indirect_off = blocks[D_BLOCK];
    if indirect_off != 0 {
        if let Ok(entries) = mount.indirect_entries(indirect_off) {
            let entries: Vec<u64> = entries.to_vec();
            for off in entries {
                if off != 0 {
                    mount.free_data_block(off);
                }
            }
        }
        mount.free_data_block(indirect_off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::new_inode;
    use crate::layout::{self, BLOCK_SIZE};
    use crate::mount::tests_support::fresh_mount;

    #[test]
    fn direct_block_allocates_on_demand() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).unwrap();
        assert_eq!(data_block_for(&mut mount, n, 0, false).unwrap(), None);
        let off = data_block_for(&mut mount, n, 0, true).unwrap().unwrap();
        assert_eq!(mount.inode(n).blocks[0], off);
        // Second call with the same k returns the same offset.
        assert_eq!(data_block_for(&mut mount, n, 0, true).unwrap(), Some(off));
    }

    #[test]
    fn newly_allocated_blocks_are_zero_filled() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).unwrap();
        let off = data_block_for(&mut mount, n, 0, true).unwrap().unwrap();
        assert!(mount.data_block(off).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn indirect_crossover_allocates_indirect_block() {
        let (_tmp, mut mount) = fresh_mount(32, 64);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).unwrap();
        for k in 0..8u64 {
            data_block_for(&mut mount, n, k, true).unwrap();
        }
        assert_ne!(mount.inode(n).blocks[layout::D_BLOCK], 0);
        let indirect_off = mount.inode(n).blocks[layout::D_BLOCK];
        let entries = mount.indirect_entries(indirect_off).unwrap();
        assert_ne!(entries[0], 0);
        assert_ne!(entries[1], 0);
    }

    #[test]
    fn exhaustion_during_allocation_is_nospace() {
        let (_tmp, mut mount) = fresh_mount(32, 2);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).unwrap();
        assert!(data_block_for(&mut mount, n, 0, true).unwrap().is_some());
        assert!(data_block_for(&mut mount, n, 1, true).unwrap().is_some());
        match data_block_for(&mut mount, n, 2, true) {
            Err(WfsError::NoSpace) => {}
            other => panic!("expected NoSpace, got {other:?}"),
        }
    }

    #[test]
    fn free_all_blocks_returns_direct_and_indirect() {
        let (_tmp, mut mount) = fresh_mount(32, 64);
        let n = new_inode(&mut mount, layout::S_IFREG | 0o644, 0, 0).unwrap();
        for k in 0..8u64 {
            data_block_for(&mut mount, n, k, true).unwrap();
        }
        let used_before = mount.data_bitmap_mut().count()
            - (0..mount.superblock().num_data_blocks)
                .filter(|&i| !mount.data_bitmap_mut().is_set(i))
                .count() as u64;
        assert!(used_before >= 9); // 8 data blocks + 1 indirect block
        free_all_blocks(&mut mount, n);
        for i in 0..mount.superblock().num_data_blocks {
            assert!(!mount.data_bitmap_mut().is_set(i));
        }
    }

    #[test]
    fn block_size_constant_matches_spec() {
        assert_eq!(BLOCK_SIZE, 512);
    }
}
