//! Subordinate ID ranges from `/etc/subuid` and `/etc/subgid`.
//!
//! Rootless container engines give each user a block of subordinate IDs.
//! The user's own ID becomes ID 0 inside the container and the subordinate
//! ranges fill container IDs 1 and up, which is exactly the mapping a tree
//! extracted in such a container needs to be shifted to the host.
//!
//! ```no_run
//! use idmapshift::subid::{EtcDir, user_mappings};
//!
//! let etc = EtcDir::open_system()?;
//! let (uid_maps, gid_maps) = user_mappings(&etc, "alice")?;
//! println!("uid {uid_maps:?} gid {gid_maps:?}");
//! # Ok::<(), idmapshift::ShiftError>(())
//! ```

use std::io::ErrorKind;

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use thiserror::Error;

use crate::error::Result;
use crate::idmap::IdMap;

/// Problems with the account database files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubidError {
    /// `/etc` itself could not be opened.
    #[error("cannot open /etc: {0}")]
    OpenEtc(#[source] std::io::Error),

    /// A file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A line does not have the `owner:start:count` shape.
    #[error("{path}:{line}: {reason}")]
    Malformed {
        /// File containing the line.
        path: &'static str,
        /// 1-based line number.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The user has no usable entry in a subordinate ID file.
    #[error("{user} has no entries in {path}")]
    NoRanges {
        /// File that was searched.
        path: &'static str,
        /// User that was searched for.
        user: String,
    },

    /// The user has no passwd entry and is not a numeric ID.
    #[error("unknown user {0}")]
    UnknownUser(String),
}

/// The `/etc` directory holding `passwd`, `subuid` and `subgid`.
#[derive(Debug)]
pub struct EtcDir(Dir);

impl EtcDir {
    /// Use `dir` in place of `/etc`.
    pub fn new(dir: Dir) -> Self {
        Self(dir)
    }

    /// Open the host's `/etc`.
    pub fn open_system() -> std::result::Result<Self, SubidError> {
        Dir::open_ambient_dir("/etc", ambient_authority())
            .map(Self)
            .map_err(SubidError::OpenEtc)
    }

    /// Contents of `name`, or `None` if it does not exist.
    fn read_optional(
        &self,
        name: &str,
        path: &'static str,
    ) -> std::result::Result<Option<String>, SubidError> {
        match self.0.read_to_string(name) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SubidError::Read { path, source }),
        }
    }
}

/// One `owner:start:count` grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubordinateRange {
    /// First host ID granted.
    pub start: u32,
    /// Number of IDs granted.
    pub count: u32,
}

/// An account from `passwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct User {
    name: String,
    uid: u32,
    gid: u32,
}

impl User {
    /// Find `name` in `passwd` content. A bare number with no entry stands
    /// for itself as both uid and gid.
    fn lookup(passwd: &str, name: &str) -> std::result::Result<Self, SubidError> {
        let found = passwd.lines().find_map(|line| {
            let mut fields = line.split(':');
            if fields.next()? != name {
                return None;
            }
            let uid = fields.nth(1)?.parse::<u32>().ok()?;
            let gid = fields.next()?.parse::<u32>().ok()?;
            Some((uid, gid))
        });
        let (uid, gid) = match found {
            Some(ids) => ids,
            None => {
                let id = name
                    .parse::<u32>()
                    .map_err(|_| SubidError::UnknownUser(name.to_string()))?;
                (id, id)
            }
        };
        Ok(Self {
            name: name.to_string(),
            uid,
            gid,
        })
    }

    /// `owner` fields in subid files may be the name or the numeric uid.
    fn is_owner(&self, owner: &str) -> bool {
        owner == self.name || owner.parse::<u32>().is_ok_and(|id| id == self.uid)
    }
}

/// Ranges granted to `user` in subid file content, in file order.
///
/// Blank lines and `#` comments are skipped. Zero-length grants are ignored.
fn parse_ranges(
    content: &str,
    path: &'static str,
    user: &User,
) -> std::result::Result<Vec<SubordinateRange>, SubidError> {
    let mut ranges = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = |reason: String| SubidError::Malformed {
            path,
            line: idx + 1,
            reason,
        };

        let fields: Vec<&str> = line.split(':').collect();
        let [owner, start, count] = fields[..] else {
            return Err(malformed(format!(
                "want owner:start:count, got {} fields",
                fields.len()
            )));
        };
        if !user.is_owner(owner) {
            continue;
        }
        let start = start
            .parse::<u32>()
            .map_err(|_| malformed(format!("bad start {start:?}")))?;
        let count = count
            .parse::<u32>()
            .map_err(|_| malformed(format!("bad count {count:?}")))?;
        if count > 0 {
            ranges.push(SubordinateRange { start, count });
        }
    }
    Ok(ranges)
}

/// Lay out `ranges` as container-side maps.
///
/// Container ID 0 is `own_id`; the ranges follow back to back from container
/// ID 1, as `podman unshare` arranges them. A range that would run past
/// `u32::MAX` on the host side is cut short and the following ranges are
/// still laid out after it. Once the container side reaches `u32::MAX` the
/// remaining ranges are dropped.
pub fn subordinate_maps(own_id: u32, ranges: &[SubordinateRange]) -> Vec<IdMap> {
    let mut maps = vec![IdMap::new(0, own_id, 1)];
    let mut next = 1u32;
    for range in ranges {
        let fits = range
            .count
            .min(u32::MAX - next)
            .min((u32::MAX - range.start).saturating_add(1));
        if fits == 0 {
            break;
        }
        maps.push(IdMap::new(next, range.start, fits));
        next += fits;
    }
    maps
}

/// Build uid and gid maps for `username` from the files in `etc`.
///
/// Both `subuid` and `subgid` must grant the user at least one range.
pub fn user_mappings(etc: &EtcDir, username: &str) -> Result<(Vec<IdMap>, Vec<IdMap>)> {
    let passwd = etc.read_optional("passwd", "/etc/passwd")?.unwrap_or_default();
    let user = User::lookup(&passwd, username)?;

    let granted = |name: &str, path: &'static str| -> Result<Vec<SubordinateRange>> {
        let content = etc.read_optional(name, path)?.unwrap_or_default();
        let ranges = parse_ranges(&content, path, &user)?;
        if ranges.is_empty() {
            return Err(SubidError::NoRanges {
                path,
                user: username.to_string(),
            }
            .into());
        }
        Ok(ranges)
    };
    let uid_ranges = granted("subuid", "/etc/subuid")?;
    let gid_ranges = granted("subgid", "/etc/subgid")?;

    tracing::debug!(
        user = username,
        uid = user.uid,
        gid = user.gid,
        uid_ranges = uid_ranges.len(),
        gid_ranges = gid_ranges.len(),
        "read subordinate ids"
    );
    Ok((
        subordinate_maps(user.uid, &uid_ranges),
        subordinate_maps(user.gid, &gid_ranges),
    ))
}

/// [`user_mappings`] against the host's `/etc`.
pub fn read_subid_mappings(username: &str) -> Result<(Vec<IdMap>, Vec<IdMap>)> {
    let etc = EtcDir::open_system()?;
    user_mappings(&etc, username)
}
