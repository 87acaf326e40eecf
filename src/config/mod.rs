//! Configuration module for kernkeep.
//!
//! `AppConfig` is persisted as TOML under `~/.config/kernkeep/config.toml`.
//! Every section and field has a default, so a missing file, a missing
//! section or a missing key all fall back to built-in values.
//!
//! # Module Structure
//!
//! - `loader`: config file location, loading and saving

pub mod loader;

use crate::error::ConfigError;
use crate::kernel::dispatcher::PackageSelection;
use crate::kernel::manager::{ScanOptions, DEFAULT_MAX_KERNEL_MAJOR};
use crate::system::boot::DEFAULT_LOW_BOOT_SPACE;
use crate::system::changelog::{DEFAULT_CHANGELOG_SERVER, DEFAULT_CHANGELOG_TIMEOUT_SECS};
use crate::system::{AptGetInstaller, PackageInstaller, RemoteChangelog, SynapticInstaller};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// File locations used by the tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub user_blacklist: PathBuf,
    pub default_blacklist: PathBuf,
    pub support_table: PathBuf,
    pub doc_root: PathBuf,
    pub dpkg_status: PathBuf,
    pub apt_lists: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let user_blacklist = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("kernkeep")
            .join("blacklist");

        PathsConfig {
            user_blacklist,
            default_blacklist: PathBuf::from("/usr/share/kernkeep/blacklist_default"),
            support_table: PathBuf::from("/usr/share/kernkeep/kernel_support"),
            doc_root: PathBuf::from(crate::system::changelog::DEFAULT_DOC_ROOT),
            dpkg_status: PathBuf::from(crate::cache::apt::DEFAULT_STATUS_PATH),
            apt_lists: PathBuf::from(crate::cache::apt::DEFAULT_LISTS_DIR),
        }
    }
}

/// External tool that carries out package operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallerBackend {
    #[default]
    Synaptic,
    AptGet,
}

impl fmt::Display for InstallerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallerBackend::Synaptic => write!(f, "synaptic"),
            InstallerBackend::AptGet => write!(f, "apt-get"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub backend: InstallerBackend,
    /// Privilege helper; empty runs the tool directly.
    pub elevation: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    pub include_headers: bool,
    pub include_extras: bool,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        OperationsConfig {
            include_headers: true,
            include_extras: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Highest `linux-image-<N>` major recognized as a kernel.
    pub max_kernel_major: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            max_kernel_major: DEFAULT_MAX_KERNEL_MAJOR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Free bytes on /boot below which installs ask for confirmation.
    pub low_space_bytes: u64,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            low_space_bytes: DEFAULT_LOW_BOOT_SPACE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Base URL of the changelog server; empty disables downloads.
    pub server: String,
    pub timeout_secs: u64,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        ChangelogConfig {
            server: DEFAULT_CHANGELOG_SERVER.to_string(),
            timeout_secs: DEFAULT_CHANGELOG_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// The first-run warning about kernel changes was acknowledged.
    pub warning_acknowledged: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub installer: InstallerConfig,
    pub operations: OperationsConfig,
    pub scan: ScanConfig,
    pub boot: BootConfig,
    pub changelog: ChangelogConfig,
    pub checks: ChecksConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load the global config, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        match loader::get_global_config_path().and_then(|path| loader::load_or_default(&path)) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("[Config] Falling back to defaults: {}", e);
                AppConfig::default()
            }
        }
    }

    /// Persist to the global config path.
    pub fn save(&self) -> Result<(), ConfigError> {
        loader::ensure_config_dir_exists()?;
        loader::save_config_to_file(self, &loader::get_global_config_path()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=9).contains(&self.scan.max_kernel_major) {
            return Err(ConfigError::ValidationFailed(format!(
                "scan.max_kernel_major must be between 1 and 9, got {}",
                self.scan.max_kernel_major
            )));
        }
        if self.paths.user_blacklist.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "paths.user_blacklist cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn selection(&self) -> PackageSelection {
        PackageSelection {
            include_headers: self.operations.include_headers,
            include_extras: self.operations.include_extras,
        }
    }

    /// Scan options for this host with the configured major bound.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::for_host().with_max_kernel_major(self.scan.max_kernel_major)
    }

    /// Changelog server for kernels without a local changelog.
    pub fn remote_changelog(&self) -> Option<RemoteChangelog> {
        let server = self.changelog.server.trim();
        if server.is_empty() {
            return None;
        }
        Some(RemoteChangelog::new(
            server,
            Duration::from_secs(self.changelog.timeout_secs),
        ))
    }

    fn elevation(&self) -> Option<String> {
        let helper = self.installer.elevation.trim();
        if helper.is_empty() {
            None
        } else {
            Some(helper.to_string())
        }
    }

    /// The configured installer backend.
    pub fn installer(&self) -> Box<dyn PackageInstaller> {
        match self.installer.backend {
            InstallerBackend::Synaptic => Box::new(SynapticInstaller {
                elevation: self.elevation(),
                ..SynapticInstaller::default()
            }),
            InstallerBackend::AptGet => Box::new(AptGetInstaller {
                elevation: self.elevation(),
                ..AptGetInstaller::default()
            }),
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        InstallerConfig {
            backend: InstallerBackend::default(),
            elevation: crate::system::installer::DEFAULT_ELEVATION.to_string(),
        }
    }
}
