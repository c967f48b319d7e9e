//! Test fixtures: small directory trees in temporary directories.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use tempfile::TempDir;

use idmapshift::Owner;

/// Entries of the standard tree, relative to its root, in walk order: the
/// root, then its directories, then its other entries, then the contents of
/// `d`.
pub const TREE_ENTRIES: &[&str] = &["", "d", "a", "b", "c", "d/1", "d/2"];

/// A temporary directory tree:
///
/// ```text
/// root/
///   a, b, c     regular files
///   d/
///     1         regular file
///     2 -> ../a symlink
/// ```
///
/// The tree is removed when dropped.
pub struct TestTree {
    /// Temporary directory holding the tree.
    _temp_dir: TempDir,
    /// Path of the tree root.
    root_path: PathBuf,
}

impl TestTree {
    /// Create the standard tree.
    pub fn new() -> color_eyre::Result<Self> {
        let temp_dir = TempDir::new()?;
        let root_path = temp_dir.path().join("root");
        std::fs::create_dir(&root_path)?;

        let root = Dir::open_ambient_dir(&root_path, ambient_authority())?;
        for name in ["a", "b", "c"] {
            root.write(name, name.as_bytes())?;
        }
        root.create_dir("d")?;
        root.write("d/1", b"1")?;
        root.symlink("../a", "d/2")?;

        Ok(Self {
            _temp_dir: temp_dir,
            root_path,
        })
    }

    /// Path of the tree root.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Absolute path of an entry; `""` is the root.
    pub fn path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root_path.clone()
        } else {
            self.root_path.join(rel)
        }
    }

    /// Ownership of an entry, without following symlinks.
    pub fn owner(&self, rel: &str) -> color_eyre::Result<Owner> {
        let meta = std::fs::symlink_metadata(self.path(rel))?;
        Ok(Owner::new(meta.uid(), meta.gid()))
    }

    /// Ownership of every entry, in walk order.
    pub fn owners(&self) -> color_eyre::Result<Vec<Owner>> {
        TREE_ENTRIES.iter().map(|rel| self.owner(rel)).collect()
    }
}

impl std::fmt::Debug for TestTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestTree")
            .field("root_path", &self.root_path)
            .finish()
    }
}

/// Returns true when running with root privileges.
pub fn is_root() -> bool {
    rustix::process::geteuid().is_root()
}
