//! Core data types for kernkeep.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One kernel image package as seen in the package cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelRecord {
    pub package: String,       // Name
    pub fullname: String,      // Name:arch
    pub version: String,       // "4.8.0.46"
    pub version_major: String, // "4.8"
    pub pkg_version: String,   // Installed or candidate; empty if unavailable
    pub size: u64,             // Download bytes
    pub installed_size: u64,   // Unpacked bytes
    pub origins: Vec<String>,  // "label (archive, site, trusted)"
    pub active: bool,          // Running?
    pub installed: bool,       // Installed?
    pub downloaded: bool,      // Config files left behind?
}

impl KernelRecord {
    /// Origins joined the way they are displayed.
    pub fn origins_display(&self) -> String {
        self.origins.join(", ")
    }

    /// Display label.
    pub fn display_label(&self) -> String {
        let mut label = format!("{} ({})", self.package, self.version);
        if self.active {
            label.push_str(" [active]");
        } else if self.installed {
            label.push_str(" [installed]");
        } else if self.downloaded {
            label.push_str(" [downloaded]");
        }
        label
    }
}

/// Blacklist rule keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlacklistKeyword {
    /// Matches `version_major` exactly.
    Group,
    /// Regex anchored at the start of the package name.
    Kernel,
    /// Anything else; never matches.
    Unknown(String),
}

impl From<&str> for BlacklistKeyword {
    fn from(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "GROUP" => BlacklistKeyword::Group,
            "KERNEL" => BlacklistKeyword::Kernel,
            other => BlacklistKeyword::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for BlacklistKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlacklistKeyword::Group => write!(f, "GROUP"),
            BlacklistKeyword::Kernel => write!(f, "KERNEL"),
            BlacklistKeyword::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// Blacklist rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistRule {
    pub keyword: BlacklistKeyword,
    pub pattern: String,
}

impl BlacklistRule {
    pub fn new(keyword: impl Into<BlacklistKeyword>, pattern: impl Into<String>) -> Self {
        BlacklistRule {
            keyword: keyword.into(),
            pattern: pattern.into(),
        }
    }
}

/// Support window of one kernel series from one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportEntry {
    pub origin: String,        // Origin label, e.g. "Ubuntu"
    pub version: String,       // Major version, e.g. "4.15"
    pub months_remaining: i64, // Negative once expired
}

/// Support state of a kernel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportStatus {
    Supported(i64),
    ExpiresThisMonth,
    Expired(i64),
    Unknown,
}

impl From<i64> for SupportStatus {
    fn from(months_remaining: i64) -> Self {
        match months_remaining {
            m if m > 0 => SupportStatus::Supported(m),
            0 => SupportStatus::ExpiresThisMonth,
            m => SupportStatus::Expired(-m),
        }
    }
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportStatus::Supported(m) => write!(f, "supported for another {} month(s)", m),
            SupportStatus::ExpiresThisMonth => write!(f, "support will expire this month"),
            SupportStatus::Expired(m) => write!(f, "support expired {} month(s) ago", m),
            SupportStatus::Unknown => write!(f, "---"),
        }
    }
}

/// Kernels sharing one `version_major`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelGroup {
    pub version_major: String,
    pub available: usize,
    pub downloaded: usize,
    pub installed: usize,
    pub has_active: bool,
    pub origins: String, // Origins of the first member, used for support lookup
}

/// Package operation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Install,
    Remove,
    Purge,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Install => "install",
            Verb::Remove => "remove",
            Verb::Purge => "purge",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(Verb::Install),
            "remove" => Ok(Verb::Remove),
            "purge" => Ok(Verb::Purge),
            _ => Err(format!("Unknown package operation: {}", s)),
        }
    }
}

/// One `(verb, package)` entry handed to the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub verb: Verb,
    pub package: String,
}

impl Operation {
    pub fn new(verb: Verb, package: impl Into<String>) -> Self {
        Operation {
            verb,
            package: package.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_is_case_insensitive() {
        assert_eq!(BlacklistKeyword::from("group"), BlacklistKeyword::Group);
        assert_eq!(BlacklistKeyword::from("Kernel"), BlacklistKeyword::Kernel);
        assert_eq!(
            BlacklistKeyword::from("flavor"),
            BlacklistKeyword::Unknown("FLAVOR".to_string())
        );
    }

    #[test]
    fn test_support_status_from_months() {
        assert_eq!(SupportStatus::from(3), SupportStatus::Supported(3));
        assert_eq!(SupportStatus::from(0), SupportStatus::ExpiresThisMonth);
        assert_eq!(SupportStatus::from(-7), SupportStatus::Expired(7));
        assert_eq!(
            SupportStatus::Expired(7).to_string(),
            "support expired 7 month(s) ago"
        );
    }

    #[test]
    fn test_verb_parse_rejects_unknown() {
        assert_eq!("purge".parse::<Verb>(), Ok(Verb::Purge));
        assert!("upgrade".parse::<Verb>().is_err());
        assert!("Install".parse::<Verb>().is_err());
    }
}
