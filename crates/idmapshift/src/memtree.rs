//! An in-memory ownership tree.
//!
//! [`MemTree`] implements [`OwnershipTree`] without touching the host
//! filesystem. It records every ownership read and write it receives, which
//! makes it possible to check exactly what a walk did: how many entries it
//! chowned, in which order, and whether a symlink or its target was touched.
//! It can also be told to fail writes on a given path.
//!
//! Path handling rejects `.`, `..` and prefix components, so a tree cannot be
//! built with two spellings of the same entry.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::error::{Result, ShiftError};
use crate::resolve::TargetOwner;
use crate::tree::{Children, Owner, OwnershipTree};

/// Errors from building a [`MemTree`].
#[derive(Error, Debug)]
pub enum MemTreeError {
    /// The path contains invalid components (e.g., "..", ".", or Windows prefixes).
    #[error("Invalid filename {0:?}")]
    InvalidFilename(Box<OsStr>),
    /// A parent directory does not exist.
    #[error("Directory entry {0:?} does not exist")]
    NotFound(Box<OsStr>),
    /// A parent exists but is not a directory.
    #[error("Directory entry {0:?} is not a subdirectory")]
    NotADirectory(Box<OsStr>),
    /// The entry already exists.
    #[error("Directory entry {0:?} already exists")]
    AlreadyExists(Box<OsStr>),
}

/// A node of the in-memory tree.
#[derive(Debug, Clone)]
pub enum Inode {
    /// A directory with named entries.
    Directory {
        /// Owner of the directory.
        owner: Owner,
        /// Child entries, ordered by name.
        entries: BTreeMap<Box<OsStr>, Inode>,
    },
    /// A regular file.
    File {
        /// Owner of the file.
        owner: Owner,
    },
    /// A symbolic link. The target is only recorded, never resolved.
    Symlink {
        /// Owner of the link itself.
        owner: Owner,
        /// Link target.
        target: PathBuf,
    },
}

impl Inode {
    /// Owner of this node.
    pub fn owner(&self) -> Owner {
        match self {
            Inode::Directory { owner, .. } | Inode::File { owner } | Inode::Symlink { owner, .. } => {
                *owner
            }
        }
    }

    fn owner_mut(&mut self) -> &mut Owner {
        match self {
            Inode::Directory { owner, .. } | Inode::File { owner } | Inode::Symlink { owner, .. } => {
                owner
            }
        }
    }

    /// Returns true if this node is a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self, Inode::Directory { .. })
    }
}

/// In-memory [`OwnershipTree`] that records the operations applied to it.
#[derive(Debug)]
pub struct MemTree {
    root_path: PathBuf,
    root: RefCell<Inode>,
    reads: Cell<usize>,
    writes: RefCell<Vec<(PathBuf, TargetOwner)>>,
    fail_writes_on: Option<PathBuf>,
}

impl MemTree {
    /// Create a tree containing only a root directory.
    ///
    /// `root_path` is only used when reporting paths.
    pub fn new(root_path: impl Into<PathBuf>, owner: Owner) -> Self {
        Self {
            root_path: root_path.into(),
            root: RefCell::new(Inode::Directory {
                owner,
                entries: BTreeMap::new(),
            }),
            reads: Cell::new(0),
            writes: RefCell::new(Vec::new()),
            fail_writes_on: None,
        }
    }

    /// Add a directory. Its parent must already exist.
    pub fn add_dir(
        &mut self,
        path: impl AsRef<Path>,
        owner: Owner,
    ) -> std::result::Result<(), MemTreeError> {
        self.insert(
            path.as_ref(),
            Inode::Directory {
                owner,
                entries: BTreeMap::new(),
            },
        )
    }

    /// Add a regular file. Its parent must already exist.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        owner: Owner,
    ) -> std::result::Result<(), MemTreeError> {
        self.insert(path.as_ref(), Inode::File { owner })
    }

    /// Add a symbolic link. Its parent must already exist.
    pub fn add_symlink(
        &mut self,
        path: impl AsRef<Path>,
        target: impl Into<PathBuf>,
        owner: Owner,
    ) -> std::result::Result<(), MemTreeError> {
        self.insert(
            path.as_ref(),
            Inode::Symlink {
                owner,
                target: target.into(),
            },
        )
    }

    /// Make every ownership write to `path` fail with `EACCES`.
    pub fn fail_writes_on(&mut self, path: impl Into<PathBuf>) {
        self.fail_writes_on = Some(path.into());
    }

    /// Current owner of the entry at `path`, without counting as a read.
    pub fn owner_of(&self, path: impl AsRef<Path>) -> Option<Owner> {
        let components = Self::components(path.as_ref()).ok()?;
        let root = self.root.borrow();
        Self::lookup(&root, &components).map(Inode::owner)
    }

    /// Number of ownership reads served so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Ownership writes applied so far, in order.
    pub fn writes(&self) -> Vec<(PathBuf, TargetOwner)> {
        self.writes.borrow().clone()
    }

    /// Split a path into validated normal components.
    fn components(path: &Path) -> std::result::Result<Vec<&OsStr>, MemTreeError> {
        let mut out = Vec::new();
        for component in path.components() {
            match component {
                Component::RootDir => {}
                Component::Normal(name) => out.push(name),
                Component::Prefix(..) | Component::CurDir | Component::ParentDir => {
                    return Err(MemTreeError::InvalidFilename(path.as_os_str().into()));
                }
            }
        }
        Ok(out)
    }

    fn lookup<'a>(mut inode: &'a Inode, components: &[&OsStr]) -> Option<&'a Inode> {
        for name in components {
            inode = match inode {
                Inode::Directory { entries, .. } => entries.get(*name)?,
                _ => return None,
            };
        }
        Some(inode)
    }

    fn lookup_mut<'a>(mut inode: &'a mut Inode, components: &[&OsStr]) -> Option<&'a mut Inode> {
        for name in components {
            inode = match inode {
                Inode::Directory { entries, .. } => entries.get_mut(*name)?,
                _ => return None,
            };
        }
        Some(inode)
    }

    fn insert(&mut self, path: &Path, node: Inode) -> std::result::Result<(), MemTreeError> {
        let components = Self::components(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Err(MemTreeError::InvalidFilename(path.as_os_str().into()));
        };

        let mut dir = self.root.get_mut();
        for parent in parents {
            dir = match dir {
                Inode::Directory { entries, .. } => entries
                    .get_mut(*parent)
                    .ok_or_else(|| MemTreeError::NotFound((*parent).into()))?,
                _ => return Err(MemTreeError::NotADirectory((*parent).into())),
            };
        }

        let Inode::Directory { entries, .. } = dir else {
            let parent = parents.last().copied().unwrap_or_default();
            return Err(MemTreeError::NotADirectory(parent.into()));
        };
        if entries.contains_key(*name) {
            return Err(MemTreeError::AlreadyExists((*name).into()));
        }
        entries.insert((*name).into(), node);
        Ok(())
    }

    fn not_found(&self, path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", self.display_path(path).display()),
        )
    }
}

impl OwnershipTree for MemTree {
    fn root(&self) -> &Path {
        &self.root_path
    }

    fn owner(&self, path: &Path) -> Result<Owner> {
        self.reads.set(self.reads.get() + 1);
        Self::components(path)
            .ok()
            .and_then(|components| Self::lookup(&self.root.borrow(), &components).map(Inode::owner))
            .ok_or_else(|| ShiftError::ReadOwner {
                path: self.display_path(path),
                source: self.not_found(path),
            })
    }

    fn set_owner(&self, path: &Path, target: TargetOwner) -> Result<()> {
        if self.fail_writes_on.as_deref() == Some(path) {
            return Err(ShiftError::SetOwner {
                path: self.display_path(path),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }

        let components = Self::components(path).map_err(|e| ShiftError::SetOwner {
            path: self.display_path(path),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;
        let mut root = self.root.borrow_mut();
        let inode = Self::lookup_mut(&mut root, &components).ok_or_else(|| ShiftError::SetOwner {
            path: self.display_path(path),
            source: self.not_found(path),
        })?;

        let owner = inode.owner_mut();
        if let Some(uid) = target.uid {
            owner.uid = uid;
        }
        if let Some(gid) = target.gid {
            owner.gid = gid;
        }
        self.writes.borrow_mut().push((path.to_path_buf(), target));
        Ok(())
    }

    fn children(&self, path: &Path) -> Result<Children> {
        let read_dir_err = |source| ShiftError::ReadDir {
            path: self.display_path(path),
            source,
        };
        let components = Self::components(path)
            .map_err(|e| read_dir_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let root = self.root.borrow();
        let entries = match Self::lookup(&root, &components) {
            Some(Inode::Directory { entries, .. }) => entries,
            Some(_) => return Err(read_dir_err(io::Error::from(io::ErrorKind::NotADirectory))),
            None => return Err(read_dir_err(self.not_found(path))),
        };

        let mut children = Children::default();
        for (name, inode) in entries {
            let child = path.join(&**name);
            if inode.is_directory() {
                children.dirs.push(child);
            } else {
                children.others.push(child);
            }
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: u32) -> Owner {
        Owner::new(id, id)
    }

    #[test]
    fn test_build_and_lookup() {
        let mut tree = MemTree::new("/guest", owner(0));
        tree.add_dir("etc", owner(0)).unwrap();
        tree.add_file("etc/passwd", owner(1)).unwrap();
        tree.add_symlink("etc/localtime", "/usr/share/zoneinfo/UTC", owner(2))
            .unwrap();

        assert_eq!(tree.owner_of(""), Some(owner(0)));
        assert_eq!(tree.owner_of("etc/passwd"), Some(owner(1)));
        assert_eq!(tree.owner_of("/etc/localtime"), Some(owner(2)));
        assert_eq!(tree.owner_of("etc/missing"), None);
        assert_eq!(tree.reads(), 0);
    }

    #[test]
    fn test_insert_errors() {
        let mut tree = MemTree::new("/guest", owner(0));
        tree.add_file("file", owner(0)).unwrap();

        assert!(matches!(
            tree.add_file("missing/child", owner(0)),
            Err(MemTreeError::NotFound(_))
        ));
        assert!(matches!(
            tree.add_file("file/child", owner(0)),
            Err(MemTreeError::NotADirectory(_))
        ));
        assert!(matches!(
            tree.add_file("file", owner(0)),
            Err(MemTreeError::AlreadyExists(_))
        ));
        assert!(matches!(
            tree.add_file("../escape", owner(0)),
            Err(MemTreeError::InvalidFilename(_))
        ));
        assert!(matches!(
            tree.add_dir("", owner(0)),
            Err(MemTreeError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_children_sorted_and_classified() {
        let mut tree = MemTree::new("/guest", owner(0));
        tree.add_file("z", owner(0)).unwrap();
        tree.add_dir("b", owner(0)).unwrap();
        tree.add_symlink("a", "b", owner(0)).unwrap();
        tree.add_dir("c", owner(0)).unwrap();

        let children = tree.children(Path::new("")).unwrap();
        assert_eq!(children.dirs, vec![PathBuf::from("b"), PathBuf::from("c")]);
        assert_eq!(children.others, vec![PathBuf::from("a"), PathBuf::from("z")]);

        let err = tree.children(Path::new("z")).unwrap_err();
        assert!(matches!(err, ShiftError::ReadDir { .. }));
    }

    #[test]
    fn test_set_owner_records_writes() {
        let mut tree = MemTree::new("/guest", owner(0));
        tree.add_file("f", owner(5)).unwrap();

        let target = TargetOwner {
            uid: Some(100),
            gid: None,
        };
        tree.set_owner(Path::new("f"), target).unwrap();
        assert_eq!(tree.owner_of("f"), Some(Owner::new(100, 5)));
        assert_eq!(tree.writes(), vec![(PathBuf::from("f"), target)]);
    }

    #[test]
    fn test_injected_write_failure() {
        let mut tree = MemTree::new("/guest", owner(0));
        tree.add_file("f", owner(5)).unwrap();
        tree.fail_writes_on("f");

        let err = tree
            .set_owner(
                Path::new("f"),
                TargetOwner {
                    uid: Some(1),
                    gid: Some(1),
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("/guest/f"));
        assert!(tree.writes().is_empty());
        assert_eq!(tree.owner_of("f"), Some(owner(5)));
    }

    #[test]
    fn test_owner_counts_reads() {
        let tree = MemTree::new("/guest", owner(0));
        tree.owner(Path::new("")).unwrap();
        assert!(tree.owner(Path::new("nope")).is_err());
        assert_eq!(tree.reads(), 2);
    }
}
