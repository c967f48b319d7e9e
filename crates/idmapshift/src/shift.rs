//! Rewriting the ownership of a tree.
//!
//! [`shift_tree`] visits every entry of an [`OwnershipTree`] once (see
//! [`walk`] for the order), resolves the entry's owner through an
//! [`IdResolver`] and writes the result back. Every visited entry gets
//! exactly one ownership read and, unless `dry_run` is set, exactly one
//! ownership write, even when the owner is already correct.
//!
//! Any read, listing or write failure aborts the walk and is returned with
//! the failing path. Entries chowned before the failure keep their new
//! ownership.
//!
//! # Example
//!
//! ```no_run
//! use idmapshift::{IdMap, ShiftOptions, shift_dir};
//!
//! let maps = [IdMap::new(0, 100000, 65536)];
//! let options = ShiftOptions {
//!     dry_run: true,
//!     verbose: true,
//!     ..Default::default()
//! };
//! shift_dir("/srv/guest-rootfs", &maps, &maps, &options, &mut std::io::stdout())?;
//! # Ok::<(), idmapshift::ShiftError>(())
//! ```

use std::io::Write;
use std::ops::ControlFlow;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, ShiftError};
use crate::idmap::{IdMap, NOBODY_ID};
use crate::resolve::IdResolver;
use crate::tree::{EntryKind, HostTree, OwnershipTree, walk};

/// Options for a shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftOptions {
    /// Owner for IDs that no mapping covers.
    pub nobody: u32,
    /// Compute and report, but never write.
    pub dry_run: bool,
    /// Report every entry as `path uid:gid -> uid:gid`.
    pub verbose: bool,
}

impl Default for ShiftOptions {
    fn default() -> Self {
        Self {
            nobody: NOBODY_ID,
            dry_run: false,
            verbose: false,
        }
    }
}

/// Statistics from a shift.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShiftStats {
    /// Entries visited, including the root.
    pub entries_visited: usize,
    /// Directories visited below the root.
    pub directories: usize,
    /// Non-directory entries visited.
    pub other_entries: usize,
    /// Entries whose owner differed from the resolved target.
    pub entries_changed: usize,
    /// Ownership writes issued.
    pub owners_written: usize,
    /// Distinct user IDs resolved.
    pub distinct_uids: usize,
    /// Distinct group IDs resolved.
    pub distinct_gids: usize,
}

/// Shift the ownership of every entry in `tree`.
///
/// Verbose records are written to `out`.
pub fn shift_tree<T, W>(
    tree: &T,
    uid_maps: &[IdMap],
    gid_maps: &[IdMap],
    options: &ShiftOptions,
    out: &mut W,
) -> Result<ShiftStats>
where
    T: OwnershipTree + ?Sized,
    W: Write + ?Sized,
{
    let mut resolver = IdResolver::new(uid_maps, gid_maps, options.nobody);
    let mut stats = ShiftStats::default();

    walk(tree, |path, kind| {
        let owner = tree.owner(path)?;
        let target = resolver.resolve(owner);

        stats.entries_visited += 1;
        match kind {
            EntryKind::Root => {}
            EntryKind::Directory => stats.directories += 1,
            EntryKind::Other => stats.other_entries += 1,
        }
        if !target.is_noop_for(owner) {
            stats.entries_changed += 1;
        }

        tracing::trace!(path = %path.display(), %owner, %target, "resolved owner");
        if options.verbose {
            writeln!(
                out,
                "{} {} -> {}",
                tree.display_path(path).display(),
                owner,
                target
            )
            .map_err(ShiftError::Output)?;
        }

        if !options.dry_run {
            tree.set_owner(path, target)?;
            stats.owners_written += 1;
        }
        Ok(ControlFlow::Continue(()))
    })?;

    (stats.distinct_uids, stats.distinct_gids) = resolver.memoized();
    tracing::debug!(
        root = %tree.root().display(),
        entries = stats.entries_visited,
        changed = stats.entries_changed,
        written = stats.owners_written,
        dry_run = options.dry_run,
        "shift complete"
    );
    Ok(stats)
}

/// Shift the ownership of the tree rooted at `path` on the host filesystem.
pub fn shift_dir<W: Write + ?Sized>(
    path: impl AsRef<Path>,
    uid_maps: &[IdMap],
    gid_maps: &[IdMap],
    options: &ShiftOptions,
    out: &mut W,
) -> Result<ShiftStats> {
    let tree = HostTree::open(path)?;
    shift_tree(&tree, uid_maps, gid_maps, options, out)
}
