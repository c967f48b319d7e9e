//! Error types for the idmapshift library.
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `Result<T, ShiftError>`.
//!
//! # Error Categories
//!
//! - **Configuration errors**: [`InvalidIdMap`], [`ConfigRead`], [`Config`],
//!   [`Subid`]. These are raised before any filesystem traversal starts.
//! - **Traversal errors**: [`ReadOwner`], [`SetOwner`], [`ReadDir`],
//!   [`OpenDir`]. Each carries the path of the entry that failed. A traversal
//!   error aborts the walk; ownership already written to earlier entries is
//!   left in place.
//! - **Output errors**: [`Output`], raised when the verbose report sink fails.
//!
//! A verification mismatch is not an error; see
//! [`Confirmation`](crate::Confirmation).
//!
//! [`InvalidIdMap`]: ShiftError::InvalidIdMap
//! [`ConfigRead`]: ShiftError::ConfigRead
//! [`Config`]: ShiftError::Config
//! [`Subid`]: ShiftError::Subid
//! [`ReadOwner`]: ShiftError::ReadOwner
//! [`SetOwner`]: ShiftError::SetOwner
//! [`ReadDir`]: ShiftError::ReadDir
//! [`OpenDir`]: ShiftError::OpenDir
//! [`Output`]: ShiftError::Output

use std::path::PathBuf;

use crate::subid::SubidError;

/// Result type alias for operations that may return a ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;

/// Error types for mapping and ownership operations.
#[derive(Debug, thiserror::Error)]
pub enum ShiftError {
    /// An ID map specification could not be parsed or is out of range.
    #[error("invalid id map {spec:?}: {reason}")]
    InvalidIdMap {
        /// The offending specification text.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reading the ownership of an entry failed.
    #[error("failed to read ownership of {}: {source}", path.display())]
    ReadOwner {
        /// Path of the entry.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Changing the ownership of an entry failed.
    #[error("failed to change ownership of {}: {source}", path.display())]
    SetOwner {
        /// Path of the entry.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Listing a directory failed.
    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        /// Path of the directory.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Opening the root directory of a walk failed.
    #[error("failed to open directory {}: {source}", path.display())]
    OpenDir {
        /// Path of the directory.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A mapping configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    ConfigRead {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A mapping configuration file is not valid TOML for this tool.
    #[error("invalid config file {}: {source}", path.display())]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// The TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Subordinate ID lookup failed.
    #[error(transparent)]
    Subid(#[from] SubidError),

    /// Writing the verbose report failed.
    #[error("failed to write report: {0}")]
    Output(#[source] std::io::Error),
}

impl ShiftError {
    /// Build an [`InvalidIdMap`](ShiftError::InvalidIdMap) error.
    pub(crate) fn invalid_map(spec: &str, reason: impl Into<String>) -> Self {
        ShiftError::InvalidIdMap {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}
