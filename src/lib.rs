//! kernkeep
//!
//! Lists, filters and manages the kernel packages of a Debian/Ubuntu system.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Kernel records, blacklist rules, support entries, operations
//! - **cache**: Package cache interface, snapshots and the dpkg/apt backend
//! - **kernel**: Version normalization, classification, blacklist, support and dispatch
//! - **system**: Running kernel, /boot space, changelogs and package installers
//! - **config**: TOML configuration
//! - **log_collector**: Disk-backed logging sink

// Core foundational modules
pub mod error;
pub mod models;

pub mod cache;
pub mod kernel;

// OS abstraction (uname, df, installers) and the log_info! macro
pub mod system;

pub mod config;

pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{init_logging, LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    BlacklistError, CacheError, ChangelogError, ConfigError, DispatchError, InstallerError, ParseError,
    RefreshError, Result, ScanError, SupportError,
};

pub use models::{
    BlacklistKeyword, BlacklistRule, KernelGroup, KernelRecord, Operation, SupportEntry,
    SupportStatus, Verb,
};

pub use cache::{AptListsSource, CacheSession, CacheSnapshot, CacheSource, PackageCache};
pub use config::AppConfig;
pub use kernel::{KernelManager, PackageSelection, ScanOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let _: Result<i32> = Ok(42);
        assert_eq!(DispatchError::EmptyBatch.status_code(), -1);
    }
}
