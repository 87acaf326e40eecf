//! /boot free space and size formatting.

use crate::log_info;
use serde::Serialize;
use std::path::Path;
use std::process::Command;

/// Free-space threshold below which installing another kernel is discouraged.
/// A kernel needs roughly 60-70 MiB on /boot.
pub const DEFAULT_LOW_BOOT_SPACE: u64 = 80_000_000;

/// Free and total bytes of the filesystem holding /boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BootSpace {
    pub free: u64,
    pub total: u64,
}

impl BootSpace {
    /// `(0, 0)` means the query failed; that is never reported as low.
    pub fn is_known(&self) -> bool {
        self.total > 0
    }

    pub fn is_low(&self, threshold: u64) -> bool {
        self.is_known() && self.free < threshold
    }
}

/// Query free and total space of `path` via `df -B 1`. Returns `(0, 0)` on failure.
pub fn boot_space(path: &Path) -> BootSpace {
    let output = match Command::new("df").arg("-B").arg("1").arg(path).output() {
        Ok(out) if out.status.success() => out,
        Ok(out) => {
            log_info!("[Boot] df exited with {:?}", out.status.code());
            return BootSpace::default();
        }
        Err(e) => {
            log_info!("[Boot] Failed to run df: {}", e);
            return BootSpace::default();
        }
    };

    parse_df_output(&String::from_utf8_lossy(&output.stdout)).unwrap_or_default()
}

/// Parse `df -B 1` output: second line, 2nd column total, 4th column available.
pub fn parse_df_output(output: &str) -> Option<BootSpace> {
    let line = output.lines().nth(1)?;
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < 4 {
        return None;
    }

    Some(BootSpace {
        free: columns[3].parse().ok()?,
        total: columns[1].parse().ok()?,
    })
}

/// Human readable size with binary prefixes, e.g. "62.5 MiB".
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return format!("{:.1} {}B", num, unit);
        }
        num /= 1024.0;
    }
    format!("{:.1} YiB", num)
}
