//! Kernel version normalization and ordering
//!
//! Package names such as `linux-image-4.8.0-46-generic` are reduced to plain
//! numeric dotted versions (`4.8.0.46`) which can then be grouped by their
//! major series (`4.8`) and ordered numerically.

use std::cmp::Ordering;

/// Prefix shared by every kernel image package.
pub const IMAGE_PREFIX: &str = "linux-image-";

/// Default cap on the number of numeric components kept by [`strip_kernel_version`].
pub const DEFAULT_MAX_SUBVERSION: usize = 10;

/// Strip a kernel package name or version string down to its numeric components.
///
/// Everything after the first `+` or `:` is dropped, the `linux-image-` prefix is
/// removed and dashes are treated as dots. Only purely numeric segments survive,
/// at most `max_subversion` of them. Returns an empty string when no numeric
/// segment is found.
///
/// # Example
/// ```
/// use kernkeep::kernel::version::strip_kernel_version;
/// assert_eq!(strip_kernel_version("linux-image-4.8.0-46-generic", 10), "4.8.0.46");
/// ```
pub fn strip_kernel_version(raw: &str, max_subversion: usize) -> String {
    let truncated = raw
        .split('+')
        .next()
        .and_then(|s| s.split(':').next())
        .unwrap_or_default();

    let stripped = truncated.replace(IMAGE_PREFIX, "").replace('-', ".");

    stripped
        .split('.')
        .filter(|segment| is_numeric(segment))
        .take(max_subversion)
        .collect::<Vec<_>>()
        .join(".")
}

/// Major series of a normalized version ("4.8" for "4.8.0.46").
///
/// Only defined for versions with at least three numeric components; anything
/// shorter is a meta package such as `linux-image-generic`.
pub fn version_major(version: &str) -> Option<String> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() > 2 && parts.iter().all(|p| is_numeric(p)) {
        Some(format!("{}.{}", parts[0], parts[1]))
    } else {
        None
    }
}

/// Compare two dotted numeric versions component-wise as integers.
///
/// Trailing `.0` runs are ignored, so `4.8` and `4.8.0` compare equal, and
/// `4.8.0.46` is newer than `4.8.0.9`.
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    numeric_components(v1).cmp(&numeric_components(v2))
}

/// [`compare_versions`] expressed as -1, 0 or 1.
pub fn compare_versions_i32(v1: &str, v2: &str) -> i32 {
    match compare_versions(v1, v2) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn numeric_components(version: &str) -> Vec<u64> {
    let mut parts: Vec<&str> = version.split('.').collect();
    while parts.len() > 1 && parts.last().map_or(false, |p| is_zero_run(p)) {
        parts.pop();
    }

    parts.iter().map(|p| p.parse::<u64>().unwrap_or(0)).collect()
}

fn is_zero_run(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c == '0')
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}
