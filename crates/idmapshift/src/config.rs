//! Mapping configuration files.
//!
//! Instead of passing `--uid`/`--gid` on every invocation, the mappings for a
//! guest can be kept in a small TOML file:
//!
//! ```toml
//! # Owner for IDs outside every range (optional)
//! nobody = 65534
//!
//! uid = ["0:100000:65536"]
//! gid = ["0:100000:1000", "1000:200000:64536"]
//! ```
//!
//! Each array element uses the same syntax as the command line, so an element
//! may itself be a comma-separated list. Elements are concatenated in order.
//!
//! # Usage Example
//!
//! ```no_run
//! use idmapshift::MappingConfig;
//!
//! let config = MappingConfig::load("/etc/idmapshift/guest.toml")?;
//! let uid_maps = config.uid_maps()?;
//! println!("{} uid ranges", uid_maps.len());
//! # Ok::<(), idmapshift::ShiftError>(())
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, ShiftError};
use crate::idmap::{IdMapList, parse_id_maps};

/// Mapping configuration, typically parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    /// Owner for IDs no range covers.
    #[serde(default)]
    pub nobody: Option<u32>,

    /// UID map specifications.
    #[serde(default)]
    pub uid: Vec<String>,

    /// GID map specifications.
    #[serde(default)]
    pub gid: Vec<String>,
}

impl MappingConfig {
    /// Parse mapping configuration from TOML content.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read and parse a configuration file, validating its maps.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ShiftError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ShiftError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.uid_maps()?;
        config.gid_maps()?;
        tracing::debug!(path = %path.display(), "loaded mapping config");
        Ok(config)
    }

    /// Parsed UID maps, in declaration order.
    pub fn uid_maps(&self) -> Result<IdMapList> {
        Self::parse_all(&self.uid)
    }

    /// Parsed GID maps, in declaration order.
    pub fn gid_maps(&self) -> Result<IdMapList> {
        Self::parse_all(&self.gid)
    }

    fn parse_all(specs: &[String]) -> Result<IdMapList> {
        let mut maps = Vec::new();
        for spec in specs {
            maps.extend(parse_id_maps(spec)?);
        }
        Ok(IdMapList(maps))
    }
}
