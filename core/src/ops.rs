//! The public operation surface: the calls a host (FUSE, `mkfs`'s
//! self-check, tests) drives the engine through. Every function here
//! takes an absolute path and ties together `path`, `dir`, `block`, and
//! `inode` without introducing new on-disk state of its own.

use crate::block;
use crate::dir;
use crate::error::{Result, WfsError};
use crate::inode;
use crate::layout::{self, BLOCK_SIZE};
use crate::mount::Mount;
use crate::path::{self, ROOT_INODE};

/// The subset of an inode's fields a host needs to answer `getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlinks: u32,
    pub atim: i64,
    pub mtim: i64,
    pub ctim: i64,
}

fn stat_of(mount: &Mount, n: u64) -> Stat {
    let ino = mount.inode(n);
    Stat {
        inode: n,
        mode: ino.mode,
        uid: ino.uid,
        gid: ino.gid,
        size: ino.size,
        nlinks: ino.nlinks,
        atim: ino.atim,
        mtim: ino.mtim,
        ctim: ino.ctim,
    }
}

/// Resolves `path` and reports its inode's attributes.
pub fn attr(mount: &Mount, path: &str) -> Result<Stat> {
    let n = path::resolve(mount, path)?;
    Ok(stat_of(mount, n))
}

/// Resolves `path` (which must name a directory) and calls `emit` for
/// `.`, `..`, then every live entry in on-disk order. `emit` returns
/// `true` to continue, `false` to stop early (the host's buffer is full).
pub fn readdir(
    mount: &Mount,
    path: &str,
    emit: &mut dyn FnMut(&str, u64) -> bool,
) -> Result<()> {
    let n = path::resolve(mount, path)?;
    if !layout::is_dir(mount.inode(n).mode) {
        return Err(WfsError::NotADirectory);
    }
    let parent = if n == ROOT_INODE {
        ROOT_INODE
    } else {
        let (parent_path, _) = path::split_parent(path).ok_or(WfsError::CorruptImage)?;
        path::resolve(mount, &parent_path)?
    };
    if !emit(".", n) {
        return Ok(());
    }
    if !emit("..", parent) {
        return Ok(());
    }
    for (name, num) in dir::entries(mount, n)? {
        if !emit(&name, num) {
            return Ok(());
        }
    }
    Ok(())
}

/// Reads up to `buf.len()` bytes of `path`'s content starting at `offset`,
/// returning the number of bytes actually copied (0 at or past EOF).
pub fn read(mount: &Mount, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
    let n = path::resolve(mount, path)?;
    let ino = mount.inode(n);
    if layout::is_dir(ino.mode) {
        return Err(WfsError::IsADirectory);
    }
    if offset >= ino.size {
        return Ok(0);
    }
    let to_read = (ino.size - offset).min(buf.len() as u64) as usize;
    let mut done = 0usize;
    while done < to_read {
        let k = (offset + done as u64) / BLOCK_SIZE;
        let intra = ((offset + done as u64) % BLOCK_SIZE) as usize;
        let chunk = (BLOCK_SIZE as usize - intra).min(to_read - done);
        let block_off = block::data_block_for_read(mount, n, k)?.ok_or(WfsError::CorruptImage)?;
        let data = mount.data_block(block_off)?;
        buf[done..done + chunk].copy_from_slice(&data[intra..intra + chunk]);
        done += chunk;
    }
    Ok(done)
}

/// Writes `buf` into `path`'s content at `offset`, extending the file and
/// allocating blocks on demand. Returns the number of bytes copied.
///
/// On `NoSpace`, bytes already copied before the failing block remain in
/// the image; the error is still returned and `size`/`mtim` are only
/// updated on full success.
pub fn write(mount: &mut Mount, path: &str, buf: &[u8], offset: u64) -> Result<usize> {
    let n = path::resolve(mount, path)?;
    if layout::is_dir(mount.inode(n).mode) {
        return Err(WfsError::IsADirectory);
    }
    let mut done = 0usize;
    while done < buf.len() {
        let k = (offset + done as u64) / BLOCK_SIZE;
        let intra = ((offset + done as u64) % BLOCK_SIZE) as usize;
        let chunk = (BLOCK_SIZE as usize - intra).min(buf.len() - done);
        let block_off = block::data_block_for(mount, n, k, true)?
            .expect("data_block_for with allocate_if_missing=true never returns None");
        let data = mount.data_block_mut(block_off)?;
        data[intra..intra + chunk].copy_from_slice(&buf[done..done + chunk]);
        done += chunk;
    }
    let end = offset + buf.len() as u64;
    let ino = mount.inode_mut(n);
    if end > ino.size {
        ino.size = end;
    }
    ino.mtim = inode::now();
    Ok(done)
}

/// Creates a regular file at `path`. Rolls back the freshly allocated
/// inode if linking it into the parent directory fails.
pub fn mknod(mount: &mut Mount, path: &str, mode: u32, uid: u32, gid: u32) -> Result<u64> {
    create(mount, path, layout::S_IFREG | (mode & !layout::S_IFMT), uid, gid)
}

/// Creates a directory at `path`. See [`mknod`].
pub fn mkdir(mount: &mut Mount, path: &str, mode: u32, uid: u32, gid: u32) -> Result<u64> {
    create(mount, path, layout::S_IFDIR | (mode & !layout::S_IFMT), uid, gid)
}

fn create(mount: &mut Mount, path: &str, mode: u32, uid: u32, gid: u32) -> Result<u64> {
    let (parent_path, name) = path::split_parent(path).ok_or(WfsError::AlreadyExists)?;
    let parent = path::resolve(mount, &parent_path)?;
    if !layout::is_dir(mount.inode(parent).mode) {
        return Err(WfsError::NotADirectory);
    }
    if dir::lookup(mount, parent, name)?.is_some() {
        return Err(WfsError::AlreadyExists);
    }
    let n = inode::new_inode(mount, mode, uid, gid)?;
    if let Err(e) = dir::insert(mount, parent, name, n) {
        inode::delete_inode(mount, n);
        return Err(e);
    }
    let t = inode::now();
    let parent_ino = mount.inode_mut(parent);
    parent_ino.mtim = t;
    parent_ino.ctim = t;
    Ok(n)
}

/// Removes the regular-file entry at `path`, releasing its blocks and
/// inode slot.
pub fn unlink(mount: &mut Mount, path: &str) -> Result<()> {
    let n = path::resolve(mount, path)?;
    if layout::is_dir(mount.inode(n).mode) {
        return Err(WfsError::IsADirectory);
    }
    let (parent_path, name) = path::split_parent(path).ok_or(WfsError::NotFound)?;
    let parent = path::resolve(mount, &parent_path)?;
    if !dir::remove(mount, parent, n, name)? {
        return Err(WfsError::CorruptImage);
    }
    block::free_all_blocks(mount, n);
    inode::delete_inode(mount, n);
    Ok(())
}

/// Removes the empty directory at `path`. Refuses the root directory and
/// any directory that still has entries.
pub fn rmdir(mount: &mut Mount, path: &str) -> Result<()> {
    let n = path::resolve(mount, path)?;
    if !layout::is_dir(mount.inode(n).mode) {
        return Err(WfsError::NotADirectory);
    }
    if !dir::is_empty(mount, n)? {
        return Err(WfsError::NotEmpty);
    }
    if n == ROOT_INODE {
        return Err(WfsError::Busy);
    }
    let (parent_path, name) = path::split_parent(path).ok_or(WfsError::Busy)?;
    let parent = path::resolve(mount, &parent_path)?;
    if !dir::remove(mount, parent, n, name)? {
        return Err(WfsError::CorruptImage);
    }
    block::free_all_blocks(mount, n);
    inode::delete_inode(mount, n);
    Ok(())
}
