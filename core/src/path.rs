//! Walks a slash-separated absolute path through the directory engine,
//! producing the terminal inode number or a not-found/not-a-directory
//! signal. Pure: never mutates the mount.

use crate::dir;
use crate::error::{Result, WfsError};
use crate::layout;
use crate::mount::Mount;

/// The root inode's slot number.
pub const ROOT_INODE: u64 = 0;

/// Resolves `path` (absolute, beginning with "/") to an inode number.
/// Leading and consecutive slashes are ignored. `"/"` resolves to the
/// root inode directly.
pub fn resolve(mount: &Mount, path: &str) -> Result<u64> {
    let mut current = ROOT_INODE;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if !layout::is_dir(mount.inode(current).mode) {
            return Err(WfsError::NotADirectory);
        }
        match dir::lookup(mount, current, component)? {
            Some(n) => current = n,
            None => return Err(WfsError::NotFound),
        }
    }
    Ok(current)
}

/// Splits `path` at the last `/` into `(parent_path, name)`, as used by
/// `mknod`/`mkdir`/`unlink`/`rmdir` to locate the containing directory.
///
/// `path` must have at least one non-empty component; returns `None`
/// for `"/"` (which has no parent).
pub fn split_parent(path: &str) -> Option<(String, &str)> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let name = &trimmed[idx + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if idx == 0 {
        "/".to_string()
    } else {
        trimmed[..idx].to_string()
    };
    Some((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::insert;
    use crate::inode::new_inode;
    use crate::layout as l;
    use crate::mount::tests_support::fresh_mount;

    #[test]
    fn root_resolves_directly() {
        let (_tmp, mount) = fresh_mount(32, 32);
        assert_eq!(resolve(&mount, "/").unwrap(), ROOT_INODE);
    }

    #[test]
    fn resolves_one_level() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let n = new_inode(&mut mount, l::S_IFREG | 0o644, 0, 0).unwrap();
        insert(&mut mount, 0, "a", n).unwrap();
        assert_eq!(resolve(&mount, "/a").unwrap(), n);
    }

    #[test]
    fn resolves_nested_and_ignores_duplicate_slashes() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let dir_n = new_inode(&mut mount, l::S_IFDIR | 0o755, 0, 0).unwrap();
        insert(&mut mount, 0, "d", dir_n).unwrap();
        let file_n = new_inode(&mut mount, l::S_IFREG | 0o644, 0, 0).unwrap();
        insert(&mut mount, dir_n, "x", file_n).unwrap();
        assert_eq!(resolve(&mount, "//d//x").unwrap(), file_n);
    }

    #[test]
    fn missing_component_is_not_found() {
        let (_tmp, mount) = fresh_mount(32, 32);
        match resolve(&mount, "/nope") {
            Err(WfsError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn non_final_non_directory_is_notdir() {
        let (_tmp, mut mount) = fresh_mount(32, 32);
        let file_n = new_inode(&mut mount, l::S_IFREG | 0o644, 0, 0).unwrap();
        insert(&mut mount, 0, "f", file_n).unwrap();
        match resolve(&mount, "/f/x") {
            Err(WfsError::NotADirectory) => {}
            other => panic!("expected NotADirectory, got {other:?}"),
        }
    }

    #[test]
    fn split_parent_examples() {
        assert_eq!(split_parent("/a"), Some(("/".to_string(), "a")));
        assert_eq!(
            split_parent("/d/x"),
            Some(("/d".to_string(), "x"))
        );
        assert_eq!(split_parent("/"), None);
    }
}
