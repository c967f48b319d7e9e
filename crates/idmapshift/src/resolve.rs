//! Resolving container IDs to host IDs.
//!
//! Resolution scans the range list in declared order and takes the first
//! map that covers the ID. IDs that no map covers resolve to the fallback
//! ("nobody") ID. Every result is memoized for the rest of the invocation:
//! a tree usually has a handful of distinct owners spread over a very large
//! number of entries, so after the first lookup each owner costs one hash
//! probe.
//!
//! An empty range list means no mapping is configured for that kind of ID.
//! The result is then [`None`], which callers treat as "leave unchanged" and
//! which is rendered as `-1` (the `lchown` convention) in reports.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::idmap::IdMap;
use crate::tree::Owner;

/// Ordered ID ranges that can be searched for a container ID.
pub trait IdRanges {
    /// Returns true if no ranges are configured.
    fn is_empty(&self) -> bool;

    /// Return the host ID of the first range covering `id`.
    fn lookup(&self, id: u32) -> Option<u32>;
}

impl IdRanges for [IdMap] {
    fn is_empty(&self) -> bool {
        <[IdMap]>::is_empty(self)
    }

    fn lookup(&self, id: u32) -> Option<u32> {
        self.iter().find_map(|map| map.map(id))
    }
}

/// Find the host ID for `id`.
///
/// Returns `None` if `ranges` is empty. Otherwise returns the memoized result
/// if there is one, else the image of `id` under the first covering range,
/// else `nobody`; the result is stored in `memo` before returning.
pub fn find_target_id<R: IdRanges + ?Sized>(
    id: u32,
    ranges: &R,
    nobody: u32,
    memo: &mut HashMap<u32, u32>,
) -> Option<u32> {
    if ranges.is_empty() {
        return None;
    }
    let target = *memo
        .entry(id)
        .or_insert_with(|| ranges.lookup(id).unwrap_or(nobody));
    Some(target)
}

/// The ownership an entry should be given.
///
/// `None` on either side means no mapping is configured for that ID kind
/// and the current value is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetOwner {
    /// Target user ID.
    pub uid: Option<u32>,
    /// Target group ID.
    pub gid: Option<u32>,
}

impl TargetOwner {
    /// Returns true if applying this target to `owner` would change nothing.
    pub fn is_noop_for(&self, owner: Owner) -> bool {
        self.uid.is_none_or(|uid| uid == owner.uid) && self.gid.is_none_or(|gid| gid == owner.gid)
    }
}

impl fmt::Display for TargetOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn side(f: &mut fmt::Formatter<'_>, id: Option<u32>) -> fmt::Result {
            match id {
                Some(id) => write!(f, "{id}"),
                None => f.write_str("-1"),
            }
        }
        side(f, self.uid)?;
        f.write_str(":")?;
        side(f, self.gid)
    }
}

/// Per-invocation resolver for both uid and gid.
///
/// Owns one memo table per ID kind. A new resolver should be created for
/// every tree walk; the memo tables are never invalidated while it lives.
#[derive(Debug)]
pub struct IdResolver<'a> {
    uid_maps: &'a [IdMap],
    gid_maps: &'a [IdMap],
    nobody: u32,
    uid_memo: HashMap<u32, u32>,
    gid_memo: HashMap<u32, u32>,
}

impl<'a> IdResolver<'a> {
    /// Create a resolver with empty memo tables.
    pub fn new(uid_maps: &'a [IdMap], gid_maps: &'a [IdMap], nobody: u32) -> Self {
        Self {
            uid_maps,
            gid_maps,
            nobody,
            uid_memo: HashMap::new(),
            gid_memo: HashMap::new(),
        }
    }

    /// Resolve a user ID.
    pub fn resolve_uid(&mut self, uid: u32) -> Option<u32> {
        find_target_id(uid, self.uid_maps, self.nobody, &mut self.uid_memo)
    }

    /// Resolve a group ID.
    pub fn resolve_gid(&mut self, gid: u32) -> Option<u32> {
        find_target_id(gid, self.gid_maps, self.nobody, &mut self.gid_memo)
    }

    /// Resolve both halves of an owner.
    pub fn resolve(&mut self, owner: Owner) -> TargetOwner {
        TargetOwner {
            uid: self.resolve_uid(owner.uid),
            gid: self.resolve_gid(owner.gid),
        }
    }

    /// Number of distinct (uid, gid) values resolved so far.
    pub fn memoized(&self) -> (usize, usize) {
        (self.uid_memo.len(), self.gid_memo.len())
    }
}
