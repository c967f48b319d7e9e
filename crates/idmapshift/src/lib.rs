#![forbid(unsafe_code)]
//! Shift filesystem ownership between user namespace ID ranges.
//!
//! A directory tree prepared for one UID/GID space (for example the IDs seen
//! inside a rootless container) can be made valid for another space (the
//! host) by applying a set of contiguous ID range mappings to the owner of
//! every file, directory and symbolic link in the tree.
//!
//! # Overview
//!
//! - [`IdMap`] describes one `container_id:host_id:size` range.
//! - [`IdResolver`] maps owners through the uid and gid range lists, with a
//!   per-invocation memo table for each and a fallback ("nobody") ID for
//!   owners no range covers.
//! - [`shift_dir`] rewrites (or, in dry-run mode, only reports) the ownership
//!   of every entry below a root.
//! - [`confirm_dir`] checks that a tree's ownership already lies inside the
//!   host side of the mappings.
//!
//! Ownership is always read and written with link-aware primitives
//! (`fstatat`/`fchownat` with `AT_SYMLINK_NOFOLLOW`), so symbolic links get
//! their own ownership shifted and are never followed.
//!
//! # Example
//!
//! ```no_run
//! use idmapshift::{IdMapList, ShiftOptions, shift_dir};
//!
//! let maps: IdMapList = "0:100000:65536".parse()?;
//! let options = ShiftOptions::default();
//! let stats = shift_dir("/var/lib/machines/guest", &maps, &maps, &options, &mut std::io::sink())?;
//! println!("shifted {} entries", stats.entries_visited);
//! # Ok::<(), idmapshift::ShiftError>(())
//! ```

// Mapping model
pub mod config;
pub mod error;
pub mod idmap;
pub mod resolve;
pub mod subid;

// Tree access
#[cfg(test)]
pub(crate) mod memtree;
pub mod tree;

// Operations
pub mod confirm;
pub mod shift;

pub use config::MappingConfig;
pub use confirm::{Confirmation, TargetRanges, confirm_dir, confirm_tree};
pub use error::{Result, ShiftError};
pub use idmap::{IdMap, IdMapList, NOBODY_ID, parse_id_maps};
pub use resolve::{IdRanges, IdResolver, TargetOwner, find_target_id};
pub use shift::{ShiftOptions, ShiftStats, shift_dir, shift_tree};
pub use tree::{Children, EntryKind, HostTree, Owner, OwnershipTree, walk};
