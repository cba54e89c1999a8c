//! Ties the mapped image to the superblock's derived pointers and exposes
//! typed, bounds-checked views over its regions.
//!
//! This is the mount context: process-wide state initialized at mount
//! and torn down at unmount, threaded (explicitly, as a `&mut Mount`
//! receiver) into every operation rather than hidden behind global state.

use crate::bitmap::BitmapAllocator;
use crate::error::{Result, WfsError};
use crate::layout::{self, DirEntry, Inode, Superblock, BLOCK_SIZE, INODE_STRIDE};
use crate::mapping::MappedImage;
use std::path::Path;

/// An open, mapped WFS image plus its superblock's derived offsets.
pub struct Mount {
    image: MappedImage,
    sb: Superblock,
}

impl Mount {
    /// Opens and maps `path`, reading and validating its superblock.
    ///
    /// Ensures the root inode's bitmap bit is set, in case the image was
    /// formatted by a tool that left it clear.
    pub fn open(path: &Path) -> Result<Self> {
        let image = MappedImage::open(path)?;
        let sb = *unsafe { layout::ref_from_bytes::<Superblock>(&image.as_slice()[..]) };
        if (image.len() as u64) < sb.image_len() {
            return Err(WfsError::CorruptImage);
        }
        let mut mount = Mount { image, sb };
        // Bit 0 must land on bit 0 specifically (the root inode), not
        // "lowest free" — set it directly rather than via `allocate()`.
        mount.inode_bitmap_bytes_mut()[0] |= 1;
        Ok(mount)
    }

    /// The superblock (immutable after format: pointers and counts never
    /// change once `mkfs` has written them).
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    fn inode_bitmap_bytes_mut(&mut self) -> &mut [u8] {
        let start = self.sb.i_bitmap_ptr as usize;
        let len = self.sb.inode_bitmap_len() as usize;
        &mut self.image.as_slice_mut()[start..start + len]
    }

    fn data_bitmap_bytes_mut(&mut self) -> &mut [u8] {
        let start = self.sb.d_bitmap_ptr as usize;
        let len = self.sb.data_bitmap_len() as usize;
        &mut self.image.as_slice_mut()[start..start + len]
    }

    /// The inode bitmap allocator (one bit per inode slot).
    pub fn inode_bitmap_mut(&mut self) -> BitmapAllocator<'_> {
        let count = self.sb.num_inodes;
        BitmapAllocator::new(self.inode_bitmap_bytes_mut(), count)
    }

    /// The data bitmap allocator (one bit per data block).
    pub fn data_bitmap_mut(&mut self) -> BitmapAllocator<'_> {
        let count = self.sb.num_data_blocks;
        BitmapAllocator::new(self.data_bitmap_bytes_mut(), count)
    }

    fn inode_offset(&self, n: u64) -> usize {
        (self.sb.i_blocks_ptr + n * INODE_STRIDE) as usize
    }

    /// A mutable typed view into inode slot `n`.
    ///
    /// Undefined for `n >= num_inodes` (debug-asserted); callers must
    /// have established validity via the bitmap allocator or path
    /// resolution before calling this.
    pub fn inode_mut(&mut self, n: u64) -> &mut Inode {
        debug_assert!(n < self.sb.num_inodes, "inode slot out of range");
        let off = self.inode_offset(n);
        let size = std::mem::size_of::<Inode>();
        unsafe { layout::ref_from_bytes_mut(&mut self.image.as_slice_mut()[off..off + size]) }
    }

    /// A read-only typed view into inode slot `n`. See [`Mount::inode_mut`].
    pub fn inode(&self, n: u64) -> &Inode {
        debug_assert!(n < self.sb.num_inodes, "inode slot out of range");
        let off = self.inode_offset(n);
        let size = std::mem::size_of::<Inode>();
        unsafe { layout::ref_from_bytes(&self.image.as_slice()[off..off + size]) }
    }

    /// Whether `offset` is a valid absolute byte offset of some block in
    /// the data region (block-aligned, within bounds).
    fn validate_data_offset(&self, offset: u64) -> Result<()> {
        if offset == 0 {
            return Err(WfsError::CorruptImage);
        }
        let region_end = self.sb.d_blocks_ptr + self.sb.data_region_len();
        if offset < self.sb.d_blocks_ptr || offset >= region_end {
            return Err(WfsError::CorruptImage);
        }
        if (offset - self.sb.d_blocks_ptr) % BLOCK_SIZE != 0 {
            return Err(WfsError::CorruptImage);
        }
        Ok(())
    }

    /// A read-only view of the data block at absolute offset `offset`.
    /// Validates the offset lies within the data region before
    /// dereferencing.
    pub fn data_block(&self, offset: u64) -> Result<&[u8]> {
        self.validate_data_offset(offset)?;
        let start = offset as usize;
        Ok(&self.image.as_slice()[start..start + BLOCK_SIZE as usize])
    }

    /// A mutable view of the data block at absolute offset `offset`. See
    /// [`Mount::data_block`].
    pub fn data_block_mut(&mut self, offset: u64) -> Result<&mut [u8]> {
        self.validate_data_offset(offset)?;
        let start = offset as usize;
        Ok(&mut self.image.as_slice_mut()[start..start + BLOCK_SIZE as usize])
    }

    /// Allocates a free data block, zero-fills it, and returns its
    /// absolute byte offset. `None` if the data allocator is exhausted.
    pub fn alloc_data_block(&mut self) -> Option<u64> {
        let idx = self.data_bitmap_mut().allocate()?;
        let offset = self.sb.d_blocks_ptr + idx * BLOCK_SIZE;
        self.data_block_mut(offset)
            .expect("freshly allocated block index must be in range")
            .fill(0);
        Some(offset)
    }

    /// Frees the data block at absolute offset `offset`. A no-op if the
    /// offset is 0 (unassigned) or invalid.
    pub fn free_data_block(&mut self, offset: u64) {
        if offset == 0 || self.validate_data_offset(offset).is_err() {
            return;
        }
        let idx = (offset - self.sb.d_blocks_ptr) / BLOCK_SIZE;
        self.data_bitmap_mut().free(idx);
    }

    /// Directory-entry slots per block, as a typed view, read-only.
    pub fn dir_entries(&self, block_offset: u64) -> Result<&[DirEntry]> {
        let bytes = self.data_block(block_offset)?;
        Ok(unsafe {
            std::slice::from_raw_parts(
                bytes.as_ptr() as *const DirEntry,
                DirEntry::ENTRIES_PER_BLOCK,
            )
        })
    }

    /// Directory-entry slots per block, as a typed view, mutable.
    pub fn dir_entries_mut(&mut self, block_offset: u64) -> Result<&mut [DirEntry]> {
        let bytes = self.data_block_mut(block_offset)?;
        Ok(unsafe {
            std::slice::from_raw_parts_mut(
                bytes.as_mut_ptr() as *mut DirEntry,
                DirEntry::ENTRIES_PER_BLOCK,
            )
        })
    }

    /// An indirect block's entries, as absolute byte offsets, read-only.
    pub fn indirect_entries(&self, block_offset: u64) -> Result<&[u64]> {
        let bytes = self.data_block(block_offset)?;
        Ok(unsafe {
            std::slice::from_raw_parts(
                bytes.as_ptr() as *const u64,
                layout::INDIRECT_ENTRIES as usize,
            )
        })
    }

    /// An indirect block's entries, as absolute byte offsets, mutable.
    pub fn indirect_entries_mut(&mut self, block_offset: u64) -> Result<&mut [u64]> {
        let bytes = self.data_block_mut(block_offset)?;
        Ok(unsafe {
            std::slice::from_raw_parts_mut(
                bytes.as_mut_ptr() as *mut u64,
                layout::INDIRECT_ENTRIES as usize,
            )
        })
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::layout::{self as l};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Formats a throwaway image in-place and opens it as a `Mount`, for
    /// use by every module's unit tests (mirrors `mkfs`'s own layout
    /// computation, kept intentionally independent of `mkfs`'s code so a
    /// bug in one does not mask a bug in the other).
    pub fn fresh_mount(num_inodes: u64, num_data_blocks: u64) -> (NamedTempFile, Mount) {
        let tmp = NamedTempFile::new().unwrap();
        let i_bitmap_ptr = std::mem::size_of::<Superblock>() as u64;
        let d_bitmap_ptr = i_bitmap_ptr + l::align_to_block(l::ceil_division(num_inodes, 8));
        let i_blocks_ptr = d_bitmap_ptr + l::align_to_block(l::ceil_division(num_data_blocks, 8));
        let d_blocks_ptr = i_blocks_ptr + num_inodes * l::INODE_STRIDE;
        let sb = Superblock {
            num_inodes,
            num_data_blocks,
            i_bitmap_ptr,
            d_bitmap_ptr,
            i_blocks_ptr,
            d_blocks_ptr,
        };
        let total = sb.image_len();

        let mut f = OpenOptions::new().write(true).open(tmp.path()).unwrap();
        f.write_all(&vec![0u8; total as usize]).unwrap();
        f.flush().unwrap();
        // Write superblock.
        {
            use std::io::{Seek, SeekFrom};
            f.seek(SeekFrom::Start(0)).unwrap();
            f.write_all(l::as_bytes(&sb)).unwrap();
        }
        // Write root inode (directory, nlinks=2).
        let mut root = Inode::zeroed();
        root.num = 0;
        root.mode = l::S_IFDIR | 0o755;
        root.nlinks = 2;
        {
            use std::io::{Seek, SeekFrom};
            f.seek(SeekFrom::Start(i_blocks_ptr)).unwrap();
            f.write_all(l::as_bytes(&root)).unwrap();
        }
        drop(f);

        let mut mount = Mount::open(tmp.path()).unwrap();
        // Root bitmap bit is set by `Mount::open`; sanity check here too.
        assert!(mount.inode_bitmap_mut().is_set(0));
        (tmp, mount)
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::fresh_mount;

    #[test]
    fn open_sets_root_bitmap_bit() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        assert!(mount.inode_bitmap_mut().is_set(0));
    }

    #[test]
    fn root_inode_is_directory() {
        let (_tmp, mount) = fresh_mount(32, 32);
        let root = mount.inode(0);
        assert!(crate::layout::is_dir(root.mode));
        assert_eq!(root.nlinks, 2);
        assert_eq!(root.size, 0);
    }

    #[test]
    fn data_block_rejects_offset_outside_region() {
        let (_tmp, mount) = fresh_mount(32, 32);
        assert!(mount.data_block(0).is_err());
        assert!(mount.data_block(mount.superblock().i_blocks_ptr).is_err());
    }

    #[test]
    fn alloc_and_free_data_block_roundtrip() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let off = mount.alloc_data_block().unwrap();
        let idx = (off - mount.superblock().d_blocks_ptr) / crate::layout::BLOCK_SIZE;
        assert!(mount.data_bitmap_mut().is_set(idx));
        mount.free_data_block(off);
        assert!(!mount.data_bitmap_mut().is_set(idx));
    }
}
