//! Verifying that a tree is already shifted.
//!
//! Confirmation walks the tree in the same order as a shift but only reads
//! ownership. An entry passes if its uid is the fallback ID or lies in the
//! host range of some uid map, and likewise for its gid. The walk stops at
//! the first entry that fails.

use std::ops::{ControlFlow, RangeInclusive};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::idmap::IdMap;
use crate::tree::{HostTree, Owner, OwnershipTree, walk};

/// Host-side ID intervals derived from a map list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRanges(Vec<RangeInclusive<u32>>);

impl TargetRanges {
    /// Collect `[host_id, host_id + size - 1]` for every map.
    pub fn from_maps(maps: &[IdMap]) -> Self {
        Self(maps.iter().filter_map(IdMap::host_range).collect())
    }

    /// Returns true if `id` is `nobody` or lies in one of the ranges.
    pub fn admits(&self, id: u32, nobody: u32) -> bool {
        id == nobody || self.0.iter().any(|range| range.contains(&id))
    }
}

/// Outcome of a confirmation walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum Confirmation {
    /// Every entry's ownership is within the target ranges.
    Confirmed {
        /// Number of entries checked.
        entries_checked: usize,
    },
    /// An entry's ownership is outside the target ranges.
    Mismatch {
        /// Path of the first failing entry.
        path: PathBuf,
        /// Its current owner.
        owner: Owner,
    },
}

impl Confirmation {
    /// Returns true if the tree passed.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed { .. })
    }
}

/// Check that every entry of `tree` is owned within the host side of the maps.
pub fn confirm_tree<T: OwnershipTree + ?Sized>(
    tree: &T,
    uid_maps: &[IdMap],
    gid_maps: &[IdMap],
    nobody: u32,
) -> Result<Confirmation> {
    let uid_ranges = TargetRanges::from_maps(uid_maps);
    let gid_ranges = TargetRanges::from_maps(gid_maps);
    let mut checked = 0;
    let mut mismatch = None;

    walk(tree, |path, _| {
        let owner = tree.owner(path)?;
        checked += 1;
        if uid_ranges.admits(owner.uid, nobody) && gid_ranges.admits(owner.gid, nobody) {
            return Ok(ControlFlow::Continue(()));
        }
        mismatch = Some((tree.display_path(path), owner));
        Ok(ControlFlow::Break(()))
    })?;

    match mismatch {
        Some((path, owner)) => {
            tracing::info!(path = %path.display(), %owner, "ownership outside target ranges");
            Ok(Confirmation::Mismatch { path, owner })
        }
        None => {
            tracing::debug!(root = %tree.root().display(), entries = checked, "ownership confirmed");
            Ok(Confirmation::Confirmed {
                entries_checked: checked,
            })
        }
    }
}

/// Confirm the ownership of the tree rooted at `path` on the host filesystem.
pub fn confirm_dir(
    path: impl AsRef<Path>,
    uid_maps: &[IdMap],
    gid_maps: &[IdMap],
    nobody: u32,
) -> Result<Confirmation> {
    let tree = HostTree::open(path)?;
    confirm_tree(&tree, uid_maps, gid_maps, nobody)
}
