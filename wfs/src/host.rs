//! Binds `fuser::Filesystem`'s inode-numbered kernel callbacks to
//! `wfs_core::ops`'s path-based operation surface.
//!
//! The engine has no notion of a FUSE inode number; it only knows paths
//! and its own on-disk inode slots. Since WFS has no hard links to
//! regular files (spec Non-goals), a disk inode has exactly one path, so
//! `fuse_ino = wfs_inode_num + 1` is a stable bijection (FUSE reserves
//! ino 0 and fixes the root at ino 1). `Host` additionally caches
//! ino -> path so a callback can hand the engine the path it actually
//! needs without re-walking the tree from root each time.

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use log::{trace, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wfs_core::layout;
use wfs_core::{Mount, Stat, WfsError};

const ROOT_FUSE_INO: u64 = 1;
const TTL: Duration = Duration::from_secs(1);

fn to_fuse_ino(wfs_num: u64) -> u64 {
    wfs_num + 1
}

fn join(parent_path: &str, name: &str) -> String {
    if parent_path == "/" {
        format!("/{name}")
    } else {
        format!("{parent_path}/{name}")
    }
}

fn secs_to_systemtime(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}

fn to_file_attr(stat: &Stat) -> FileAttr {
    let kind = if layout::is_dir(stat.mode) {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    FileAttr {
        ino: to_fuse_ino(stat.inode),
        size: stat.size,
        blocks: (stat.size + layout::BLOCK_SIZE - 1) / layout::BLOCK_SIZE,
        atime: secs_to_systemtime(stat.atim),
        mtime: secs_to_systemtime(stat.mtim),
        ctime: secs_to_systemtime(stat.ctim),
        crtime: secs_to_systemtime(stat.ctim),
        kind,
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlinks,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// The FUSE-facing filesystem object: a mounted image plus the ino/path
/// bridge described above.
pub struct Host {
    mount: Mutex<Mount>,
    paths: Mutex<HashMap<u64, String>>,
}

impl Host {
    pub fn new(mount: Mount) -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT_FUSE_INO, "/".to_string());
        Host {
            mount: Mutex::new(mount),
            paths: Mutex::new(paths),
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.lock().unwrap().get(&ino).cloned()
    }

    fn remember(&self, ino: u64, path: String) {
        self.paths.lock().unwrap().insert(ino, path);
    }

    fn forget_path(&self, ino: u64) {
        self.paths.lock().unwrap().remove(&ino);
    }
}

fn errno(e: &WfsError) -> i32 {
    e.errno()
}

impl Filesystem for Host {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent) else {
            trace!("lookup: unknown parent ino {parent}");
            reply.error(libc::ESTALE);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let child_path = join(&parent_path, name);
        trace!("lookup({child_path})");
        let mount = self.mount.lock().unwrap();
        match wfs_core::ops::attr(&mount, &child_path) {
            Ok(stat) => {
                let ino = to_fuse_ino(stat.inode);
                drop(mount);
                self.remember(ino, child_path);
                reply.entry(&TTL, &to_file_attr(&stat), 0);
            }
            Err(e) => {
                warn!("lookup({child_path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ESTALE);
            return;
        };
        trace!("getattr({path})");
        let mount = self.mount.lock().unwrap();
        match wfs_core::ops::attr(&mount, &path) {
            Ok(stat) => reply.attr(&TTL, &to_file_attr(&stat)),
            Err(e) => {
                warn!("getattr({path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn open(&mut self, _req: &Request, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn opendir(&mut self, _req: &Request, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ESTALE);
            return;
        };
        trace!("read({path}, offset={offset}, size={size})");
        let mount = self.mount.lock().unwrap();
        let mut buf = vec![0u8; size as usize];
        match wfs_core::ops::read(&mount, &path, &mut buf, offset as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => {
                warn!("read({path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ESTALE);
            return;
        };
        trace!("write({path}, offset={offset}, len={})", data.len());
        let mut mount = self.mount.lock().unwrap();
        match wfs_core::ops::write(&mut mount, &path, data, offset as u64) {
            Ok(n) => reply.written(n as u32),
            Err(e) => {
                warn!("write({path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ESTALE);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let child_path = join(&parent_path, name);
        trace!("mknod({child_path})");
        let mut mount = self.mount.lock().unwrap();
        match wfs_core::ops::mknod(&mut mount, &child_path, mode, req.uid(), req.gid()) {
            Ok(n) => {
                let stat = wfs_core::ops::attr(&mount, &child_path).unwrap();
                drop(mount);
                let ino = to_fuse_ino(n);
                self.remember(ino, child_path);
                reply.entry(&TTL, &to_file_attr(&stat), 0);
            }
            Err(e) => {
                warn!("mknod({child_path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ESTALE);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let child_path = join(&parent_path, name);
        trace!("create({child_path})");
        let mut mount = self.mount.lock().unwrap();
        match wfs_core::ops::mknod(&mut mount, &child_path, mode, req.uid(), req.gid()) {
            Ok(n) => {
                let stat = wfs_core::ops::attr(&mount, &child_path).unwrap();
                drop(mount);
                let ino = to_fuse_ino(n);
                self.remember(ino, child_path);
                reply.created(&TTL, &to_file_attr(&stat), 0, 0, 0);
            }
            Err(e) => {
                warn!("create({child_path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ESTALE);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let child_path = join(&parent_path, name);
        trace!("mkdir({child_path})");
        let mut mount = self.mount.lock().unwrap();
        match wfs_core::ops::mkdir(&mut mount, &child_path, mode, req.uid(), req.gid()) {
            Ok(n) => {
                let stat = wfs_core::ops::attr(&mount, &child_path).unwrap();
                drop(mount);
                let ino = to_fuse_ino(n);
                self.remember(ino, child_path);
                reply.entry(&TTL, &to_file_attr(&stat), 0);
            }
            Err(e) => {
                warn!("mkdir({child_path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ESTALE);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let child_path = join(&parent_path, name);
        trace!("unlink({child_path})");
        let mut mount = self.mount.lock().unwrap();
        let existing_ino = wfs_core::ops::attr(&mount, &child_path)
            .ok()
            .map(|s| to_fuse_ino(s.inode));
        match wfs_core::ops::unlink(&mut mount, &child_path) {
            Ok(()) => {
                drop(mount);
                if let Some(ino) = existing_ino {
                    self.forget_path(ino);
                }
                reply.ok();
            }
            Err(e) => {
                warn!("unlink({child_path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ESTALE);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let child_path = join(&parent_path, name);
        trace!("rmdir({child_path})");
        let mut mount = self.mount.lock().unwrap();
        let existing_ino = wfs_core::ops::attr(&mount, &child_path)
            .ok()
            .map(|s| to_fuse_ino(s.inode));
        match wfs_core::ops::rmdir(&mut mount, &child_path) {
            Ok(()) => {
                drop(mount);
                if let Some(ino) = existing_ino {
                    self.forget_path(ino);
                }
                reply.ok();
            }
            Err(e) => {
                warn!("rmdir({child_path}): {e}");
                reply.error(errno(&e));
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ESTALE);
            return;
        };
        trace!("readdir({path}, offset={offset})");
        let mount = self.mount.lock().unwrap();
        let mut index = 0i64;
        let result = wfs_core::ops::readdir(&mount, &path, &mut |name, num| {
            index += 1;
            if index <= offset {
                return true;
            }
            let kind = if layout::is_dir(mount.inode(num).mode) {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            !reply.add(to_fuse_ino(num), index, kind, name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!("readdir({path}): {e}");
                reply.error(errno(&e));
            }
        }
    }
}
