//! ID range mappings.
//!
//! An [`IdMap`] translates a contiguous block of `size` IDs starting at
//! `container_id` to a block of the same size starting at `host_id`. This is
//! the same triple found in `/proc/<pid>/uid_map` and in the
//! `newuidmap`/`newgidmap` argument lists.
//!
//! On the command line and in config files a list of maps is written as
//! comma-separated `container-id:host-id:count` triples:
//!
//! ```
//! use idmapshift::IdMapList;
//!
//! let maps: IdMapList = "0:10000:10,10:20000:1000".parse()?;
//! assert_eq!(maps.len(), 2);
//! assert_eq!(maps[1].map(100), Some(20090));
//! # Ok::<(), idmapshift::ShiftError>(())
//! ```

use std::fmt;
use std::ops::{Deref, RangeInclusive};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};

/// Owner assigned to IDs that no mapping covers.
pub const NOBODY_ID: u32 = 65534;

/// A single ID mapping entry.
///
/// Maps a range of IDs from the container namespace to the host namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap {
    /// The starting ID in the container namespace
    pub container_id: u32,
    /// The starting ID in the host namespace
    pub host_id: u32,
    /// The number of IDs in this mapping
    pub size: u32,
}

impl IdMap {
    /// Create a new ID mapping.
    pub fn new(container_id: u32, host_id: u32, size: u32) -> Self {
        Self {
            container_id,
            host_id,
            size,
        }
    }

    /// Returns true if `id` lies in `[container_id, container_id + size)`.
    ///
    /// A zero-sized map contains nothing.
    pub fn contains(&self, id: u32) -> bool {
        id >= self.container_id && id - self.container_id < self.size
    }

    /// Translate a container ID to its host ID, if this map covers it.
    pub fn map(&self, id: u32) -> Option<u32> {
        if !self.contains(id) {
            return None;
        }
        self.host_id.checked_add(id - self.container_id)
    }

    /// The inclusive range of host IDs this map produces.
    ///
    /// Returns `None` for a zero-sized map.
    pub fn host_range(&self) -> Option<RangeInclusive<u32>> {
        let last = self.size.checked_sub(1)?;
        Some(self.host_id..=self.host_id.saturating_add(last))
    }

    fn validate(self, spec: &str) -> Result<Self> {
        if self.size == 0 {
            return Err(ShiftError::invalid_map(spec, "count must be greater than zero"));
        }
        let last = self.size - 1;
        if self.container_id.checked_add(last).is_none() {
            return Err(ShiftError::invalid_map(
                spec,
                "container range extends past the largest ID",
            ));
        }
        if self.host_id.checked_add(last).is_none() {
            return Err(ShiftError::invalid_map(
                spec,
                "host range extends past the largest ID",
            ));
        }
        Ok(self)
    }
}

impl fmt::Display for IdMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.container_id, self.host_id, self.size)
    }
}

impl FromStr for IdMap {
    type Err = ShiftError;

    fn from_str(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 3 {
            return Err(ShiftError::invalid_map(
                spec,
                "correct syntax is guest-id:host-id:count",
            ));
        }

        let mut vals = [0u32; 3];
        for (val, part) in vals.iter_mut().zip(&parts) {
            *val = part.trim().parse().map_err(|_| {
                ShiftError::invalid_map(spec, "values must be non-negative integers")
            })?;
        }

        IdMap::new(vals[0], vals[1], vals[2]).validate(spec)
    }
}

/// Parse a comma-separated list of `container-id:host-id:count` triples.
pub fn parse_id_maps(spec: &str) -> Result<Vec<IdMap>> {
    spec.split(',').map(str::parse).collect()
}

/// An ordered list of ID maps for one kind of ID (uid or gid).
///
/// Order matters: when maps overlap, the first one declared wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapList(pub Vec<IdMap>);

impl IdMapList {
    /// Consume the list and return the underlying maps.
    pub fn into_inner(self) -> Vec<IdMap> {
        self.0
    }
}

impl Deref for IdMapList {
    type Target = [IdMap];

    fn deref(&self) -> &[IdMap] {
        &self.0
    }
}

impl From<Vec<IdMap>> for IdMapList {
    fn from(maps: Vec<IdMap>) -> Self {
        Self(maps)
    }
}

impl FromStr for IdMapList {
    type Err = ShiftError;

    fn from_str(spec: &str) -> Result<Self> {
        parse_id_maps(spec).map(Self)
    }
}

impl fmt::Display for IdMapList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, map) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{map}")?;
        }
        Ok(())
    }
}
