//! Lookup, insert, and remove of (name → inode-number) bindings within a
//! directory inode's data blocks.
//!
//! A directory's storage is an ordered sequence of fixed-size
//! directory-entry slots, laid out contiguously across its allocated
//! blocks (direct slots first, then the indirect block's entries, both
//! in order). Entries with `num == 0` are free. `.` and `..` are never
//! stored here; synthesizing them is left to the caller
//! (`ops::readdir`/`ops::is_empty`-adjacent logic).
//!
//! Blocks emptied by `remove` are never reclaimed (see `DESIGN.md`'s open
//! question on directory-block reclamation): a directory that has had
//! many entries inserted and removed keeps its data blocks.

use crate::block;
use crate::error::Result;
use crate::layout::{DirEntry, D_BLOCK};
use crate::mount::Mount;

/// Every currently-assigned data block of `dir_num`, in spec order
/// (direct slots 0..D_BLOCK-1, then the indirect block's entries).
fn allocated_blocks(mount: &Mount, dir_num: u64) -> Result<Vec<u64>> {
    let inode = mount.inode(dir_num);
    let mut out = Vec::new();
    for &off in &inode.blocks[..D_BLOCK] {
        if off != 0 {
            out.push(off);
        }
    }
    let indirect = inode.blocks[D_BLOCK];
    if indirect != 0 {
        for &off in mount.indirect_entries(indirect)? {
            if off != 0 {
                out.push(off);
            }
        }
    }
    Ok(out)
}

/// Scans `dir_num`'s entries for `name`. First match wins.
pub fn lookup(mount: &Mount, dir_num: u64, name: &str) -> Result<Option<u64>> {
    for block_off in allocated_blocks(mount, dir_num)? {
        for entry in mount.dir_entries(block_off)? {
            if !entry.is_free() && entry.name_matches(name) {
                return Ok(Some(entry.num as u64));
            }
        }
    }
    Ok(None)
}

/// Writes a `(name, target)` binding into the lowest-indexed free slot,
/// growing the directory's storage through the block-pointer engine if
/// every allocated slot is occupied.
///
/// Returns [`crate::error::WfsError::NoSpace`] only when the block
/// allocator is exhausted.
pub fn insert(mount: &mut Mount, dir_num: u64, name: &str, target: u64) -> Result<()> {
    let blocks = allocated_blocks(mount, dir_num)?;
    for block_off in &blocks {
        let entries = mount.dir_entries_mut(*block_off)?;
        if let Some(slot) = entries.iter_mut().find(|e| e.is_free()) {
            *slot = DirEntry::new(name, target as u32);
            return Ok(());
        }
    }
    // No free slot in any allocated block: grow storage by one block.
    let next_k = blocks.len() as u64;
    let offset = block::data_block_for(mount, dir_num, next_k, true)?
        .expect("data_block_for with allocate_if_missing=true never returns None");
    mount.dir_entries_mut(offset)?[0] = DirEntry::new(name, target as u32);
    Ok(())
}

/// Tombstones the slot whose `num` and `name` both match. Returns `true`
/// if a matching slot was found and cleared, `false` otherwise.
pub fn remove(mount: &mut Mount, dir_num: u64, target_num: u64, name: &str) -> Result<bool> {
    for block_off in allocated_blocks(mount, dir_num)? {
        let entries = mount.dir_entries_mut(block_off)?;
        if let Some(slot) = entries
            .iter_mut()
            .find(|e| !e.is_free() && e.num as u64 == target_num && e.name_matches(name))
        {
            *slot = DirEntry::free();
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether `dir_num` has no live entries (ignoring the synthesized `.`/`..`).
pub fn is_empty(mount: &Mount, dir_num: u64) -> Result<bool> {
    for block_off in allocated_blocks(mount, dir_num)? {
        if mount.dir_entries(block_off)?.iter().any(|e| !e.is_free()) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Every live `(name, inode_num)` binding in `dir_num`, in on-disk order.
/// Used by `ops::readdir`.
pub fn entries(mount: &Mount, dir_num: u64) -> Result<Vec<(String, u64)>> {
    let mut out = Vec::new();
    for block_off in allocated_blocks(mount, dir_num)? {
        for entry in mount.dir_entries(block_off)? {
            if !entry.is_free() {
                out.push((entry.name_str().to_owned(), entry.num as u64));
            }
        }
    }
    Ok(out)
}
