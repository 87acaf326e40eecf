//! Unified error type hierarchy for kernkeep
//!
//! Provides structured error handling with ParseError, CacheError, ScanError,
//! InstallerError, DispatchError, RefreshError, BlacklistError, SupportError,
//! ChangelogError and ConfigError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed input lines (versions, blacklist rules, support entries, control stanzas).
///
/// These are always absorbed by the caller: the offending entry is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No numeric version components in '{0}'")]
    EmptyVersion(String),

    #[error("Version '{0}' has fewer than three numeric components")]
    ShortVersion(String),

    #[error("Blacklist line has no pattern: '{0}'")]
    BlacklistLine(String),

    #[error("Support table line is not 'origin,version,month,year': '{0}'")]
    SupportLine(String),

    #[error("Invalid number '{value}' in '{line}'")]
    InvalidNumber { value: String, line: String },

    #[error("Control field without a stanza: '{0}'")]
    ControlField(String),
}

/// Package cache load and access errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Package status database not readable at {path}: {source}")]
    StatusUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Package lists directory not readable at {path}: {source}")]
    ListsUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Package cache is unavailable: {0}")]
    Unavailable(String),
}

/// Failure while scanning the cache for kernel packages.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Kernel scan failed: {source}")]
    ScanFailed {
        #[from]
        source: CacheError,
    },

    #[error("Cache snapshot generation {snapshot} is stale (current generation {current})")]
    StaleSnapshot { snapshot: u64, current: u64 },
}

/// External package installer errors.
#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("Command '{cmd}' could not be started: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("Command '{cmd}' exited with status {code:?}")]
    ExitStatus { cmd: String, code: Option<i32> },

    #[error("Selection file could not be written: {0}")]
    SelectionFile(#[from] io::Error),
}

/// Errors returned while submitting an operation batch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Operation batch is empty")]
    EmptyBatch,

    #[error("Malformed operation for package '{0}'")]
    MalformedOperation(String),

    #[error("Package installer failed: {0}")]
    Installer(#[from] InstallerError),
}

impl DispatchError {
    /// Integer status used by callers that only understand exit codes.
    pub fn status_code(&self) -> i32 {
        match self {
            DispatchError::EmptyBatch => -1,
            DispatchError::MalformedOperation(_) => -2,
            DispatchError::Installer(_) => -3,
        }
    }
}

/// Failure of a package list refresh.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Package list refresh failed: {0}")]
    Installer(#[from] InstallerError),

    #[error("Cache reopen after refresh failed: {0}")]
    Cache(#[from] CacheError),
}

/// Blacklist file errors.
#[derive(Error, Debug)]
pub enum BlacklistError {
    #[error("Blacklist file {path} could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Blacklist file {path} could not be seeded: {source}")]
    Seed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Support table errors.
#[derive(Error, Debug)]
pub enum SupportError {
    #[error("Support table {path} could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Remote changelog download errors.
#[derive(Error, Debug)]
pub enum ChangelogError {
    #[error("Changelog request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Changelog server returned {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Configuration file parsing and persistence errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Config could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level result type for the binary.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
