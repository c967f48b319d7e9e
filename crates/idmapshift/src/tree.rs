//! Ownership access to a directory tree.
//!
//! The walkers in [`shift`](crate::shift) and [`confirm`](crate::confirm) run
//! against the [`OwnershipTree`] trait. Entries are addressed by their path
//! relative to the tree root; the empty path is the root itself.
//!
//! [`HostTree`] is the real implementation. It holds a cap-std [`Dir`] for
//! the root and issues `fstatat`/`fchownat` with `AT_SYMLINK_NOFOLLOW`
//! relative to it, so symbolic links are read and chowned as themselves and
//! never traversed. That includes the root: a root that is a symlink is a
//! tree of one entry, the link.

use std::cell::Cell;
use std::fmt;
use std::ops::ControlFlow;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use rustix::fs::{AtFlags, CWD, FileType, Gid, Uid};
use serde::Serialize;

use crate::error::{Result, ShiftError};
use crate::resolve::TargetOwner;

/// Owning user and group of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Owner {
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
}

impl Owner {
    /// Create an owner.
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// How an entry was reached during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The root of the walk.
    Root,
    /// A directory below the root. Directories are descended into.
    Directory,
    /// Anything else: regular files, symlinks, devices, fifos, sockets.
    Other,
}

/// The immediate children of a directory, as paths relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children {
    /// Child directories (not symlinks to directories), sorted by name.
    pub dirs: Vec<PathBuf>,
    /// All other children, sorted by name.
    pub others: Vec<PathBuf>,
}

/// A tree whose entries' ownership can be read and changed.
///
/// Implementations must never follow symbolic links: `owner` and `set_owner`
/// act on a link itself, and `children` reports links under
/// [`Children::others`].
pub trait OwnershipTree {
    /// Path of the root, used for reporting.
    fn root(&self) -> &Path;

    /// Read the current owner of the entry at `path`.
    fn owner(&self, path: &Path) -> Result<Owner>;

    /// Change the ownership of the entry at `path`. A `None` half is left
    /// unchanged.
    fn set_owner(&self, path: &Path, target: TargetOwner) -> Result<()>;

    /// List the children of the directory at `path`.
    fn children(&self, path: &Path) -> Result<Children>;

    /// Full path of an entry for reports and errors.
    fn display_path(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() {
            self.root().to_path_buf()
        } else {
            self.root().join(path)
        }
    }
}

/// Walk every entry of `tree` exactly once.
///
/// The root is visited first. Then, top-down and starting at the root, each
/// directory's child directories are visited, followed by its other
/// children, before descending into the child directories in order.
///
/// Returns `ControlFlow::Break` if `visit` stopped the walk early.
pub fn walk<T, F>(tree: &T, mut visit: F) -> Result<ControlFlow<()>>
where
    T: OwnershipTree + ?Sized,
    F: FnMut(&Path, EntryKind) -> Result<ControlFlow<()>>,
{
    if visit(Path::new(""), EntryKind::Root)?.is_break() {
        return Ok(ControlFlow::Break(()));
    }

    let mut pending = vec![PathBuf::new()];
    while let Some(dir) = pending.pop() {
        let children = tree.children(&dir)?;
        for path in &children.dirs {
            if visit(path, EntryKind::Directory)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        for path in &children.others {
            if visit(path, EntryKind::Other)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        // Stack: push in reverse so the first directory is descended first.
        pending.extend(children.dirs.into_iter().rev());
    }

    Ok(ControlFlow::Continue(()))
}

/// A directory tree on the host filesystem.
#[derive(Debug)]
pub struct HostTree {
    root: PathBuf,
    /// Handle to the root; `None` if the root is not a directory.
    dir: Option<Dir>,
    /// Root owner from the stat in `open`, served to the first root read.
    root_owner: Cell<Option<Owner>>,
}

impl HostTree {
    /// Open the tree rooted at `root`.
    ///
    /// The root itself is examined without following links. If it is a
    /// directory its contents are walked; any other kind of root, including
    /// a symlink to a directory, is a tree of one entry.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let stat = rustix::fs::statat(CWD, &root, AtFlags::SYMLINK_NOFOLLOW).map_err(|e| {
            ShiftError::ReadOwner {
                path: root.clone(),
                source: e.into(),
            }
        })?;

        let dir = match FileType::from_raw_mode(stat.st_mode) {
            FileType::Directory => Some(
                Dir::open_ambient_dir(&root, ambient_authority()).map_err(|source| {
                    ShiftError::OpenDir {
                        path: root.clone(),
                        source,
                    }
                })?,
            ),
            FileType::Symlink => {
                tracing::warn!(root = %root.display(), "root is a symlink; not descending");
                None
            }
            _ => None,
        };

        tracing::debug!(root = %root.display(), walk = dir.is_some(), "opened tree");
        Ok(Self {
            root,
            dir,
            root_owner: Cell::new(Some(Owner::new(stat.st_uid, stat.st_gid))),
        })
    }

    /// Resolve an entry to a directory fd and a path relative to it.
    ///
    /// The root is addressed by its own path, relative to the cwd.
    fn locate<'a>(&'a self, path: &'a Path) -> (BorrowedFd<'a>, &'a Path) {
        match &self.dir {
            Some(dir) if !path.as_os_str().is_empty() => (dir.as_fd(), path),
            _ => (CWD, &self.root),
        }
    }
}

impl OwnershipTree for HostTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn owner(&self, path: &Path) -> Result<Owner> {
        if path.as_os_str().is_empty()
            && let Some(owner) = self.root_owner.take()
        {
            return Ok(owner);
        }
        let (fd, rel) = self.locate(path);
        let stat = rustix::fs::statat(fd, rel, AtFlags::SYMLINK_NOFOLLOW).map_err(|e| {
            ShiftError::ReadOwner {
                path: self.display_path(path),
                source: e.into(),
            }
        })?;
        Ok(Owner::new(stat.st_uid, stat.st_gid))
    }

    fn set_owner(&self, path: &Path, target: TargetOwner) -> Result<()> {
        if path.as_os_str().is_empty() {
            self.root_owner.set(None);
        }
        let (fd, rel) = self.locate(path);
        rustix::fs::chownat(
            fd,
            rel,
            target.uid.map(Uid::from_raw),
            target.gid.map(Gid::from_raw),
            AtFlags::SYMLINK_NOFOLLOW,
        )
        .map_err(|e| ShiftError::SetOwner {
            path: self.display_path(path),
            source: e.into(),
        })
    }

    fn children(&self, path: &Path) -> Result<Children> {
        let Some(dir) = &self.dir else {
            return Ok(Children::default());
        };
        let read_dir_err = |source| ShiftError::ReadDir {
            path: self.display_path(path),
            source,
        };

        let entries = if path.as_os_str().is_empty() {
            dir.entries()
        } else {
            dir.read_dir(path)
        }
        .map_err(read_dir_err)?;

        let mut children = Children::default();
        for entry in entries {
            let entry = entry.map_err(read_dir_err)?;
            let child = path.join(entry.file_name());
            // DirEntry::file_type does not follow symlinks.
            if entry.file_type().map_err(read_dir_err)?.is_dir() {
                children.dirs.push(child);
            } else {
                children.others.push(child);
            }
        }
        children.dirs.sort();
        children.others.sort();
        Ok(children)
    }
}
