/// Kernel Manager module: kernel classification over the package cache
///
/// This module handles:
/// - Building one `KernelRecord` per kernel image package in a cache snapshot
/// - Grouping records by major series
/// - Accounting for disk space occupied by kernels
/// - The `KernelManager` facade tying cache session, blacklist and installer together
///
/// Only packages named `linux-image-<digit>...` with a bounded leading major
/// version are considered kernels.

use crate::cache::{CacheSession, CacheSnapshot, CacheSource, Package, PackageCache};
use crate::error::{CacheError, DispatchError, ParseError, RefreshError, ScanError};
use crate::kernel::blacklist::apply_blacklist;
use crate::kernel::dispatcher::{perform_kernels, PackageSelection};
use crate::kernel::version::{
    compare_versions, strip_kernel_version, version_major, DEFAULT_MAX_SUBVERSION, IMAGE_PREFIX,
};
use crate::log_info;
use crate::models::{BlacklistRule, KernelGroup, KernelRecord, Verb};
use crate::system::{is_64bit_arch, InstallerOutput, PackageInstaller};
use std::sync::Arc;

/// Highest kernel major version recognized by default.
pub const DEFAULT_MAX_KERNEL_MAJOR: u32 = 5;

/// Inputs of a kernel scan that come from the host rather than the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub host_is_64bit: bool,
    /// Running kernel release, e.g. "4.10.0-28-generic"
    pub current_kernel: String,
    pub max_kernel_major: u32,
}

impl ScanOptions {
    pub fn new(current_kernel: impl Into<String>, host_is_64bit: bool) -> Self {
        ScanOptions {
            host_is_64bit,
            current_kernel: current_kernel.into(),
            max_kernel_major: DEFAULT_MAX_KERNEL_MAJOR,
        }
    }

    /// Options for the machine we are running on.
    pub fn for_host() -> Self {
        ScanOptions::new(crate::system::current_kernel(), crate::system::host_is_64bit())
    }

    pub fn with_max_kernel_major(mut self, max_kernel_major: u32) -> Self {
        self.max_kernel_major = max_kernel_major;
        self
    }
}

/// Whether `name` is a kernel image package with a leading major version in `1..=max_major`.
pub fn is_kernel_image(name: &str, max_major: u32) -> bool {
    name.strip_prefix(IMAGE_PREFIX)
        .and_then(|rest| rest.chars().next())
        .and_then(|c| c.to_digit(10))
        .map_or(false, |major| (1..=max_major).contains(&major))
}

/// Format a repository origin the way it is displayed.
fn describe_origin(origin: &crate::cache::Origin) -> String {
    format!(
        "{} ({}, {}, {})",
        origin.label,
        origin.archive,
        origin.site,
        if origin.trusted { "trusted" } else { "not trusted" }
    )
}

/// Build the kernel record of one package, or explain why it is not a kernel.
pub fn kernel_record(pkg: &Package, current_kernel: &str) -> Result<KernelRecord, ParseError> {
    let version = strip_kernel_version(&pkg.name, DEFAULT_MAX_SUBVERSION);
    if version.is_empty() {
        return Err(ParseError::EmptyVersion(pkg.name.clone()));
    }
    let version_major =
        version_major(&version).ok_or_else(|| ParseError::ShortVersion(pkg.name.clone()))?;

    let active = pkg.name.strip_prefix(IMAGE_PREFIX) == Some(current_kernel);

    let pkg_version = if pkg.is_installed {
        pkg.installed.as_ref().map(|v| v.version.clone())
    } else {
        pkg.candidate
            .as_ref()
            .filter(|c| c.downloadable)
            .map(|c| c.version.clone())
    }
    .unwrap_or_default();

    let (size, installed_size) = pkg
        .candidate
        .as_ref()
        .map_or((0, 0), |c| (c.size, c.installed_size));

    let origins = pkg
        .candidate
        .iter()
        .flat_map(|c| c.origins.iter())
        .filter(|o| !o.is_local())
        .map(describe_origin)
        .collect();

    Ok(KernelRecord {
        package: pkg.name.clone(),
        fullname: pkg.fullname(),
        version,
        version_major,
        pkg_version,
        size,
        installed_size,
        origins,
        active,
        installed: pkg.is_installed,
        downloaded: pkg.has_config_files,
    })
}

/// Scan the cache for kernel image packages, newest first.
///
/// Packages of the other word size than the host are ignored. Names that do
/// not carry at least three numeric version components (meta packages such
/// as `linux-image-generic`) are skipped.
pub fn get_kernels(cache: &dyn PackageCache, opts: &ScanOptions) -> Result<Vec<KernelRecord>, ScanError> {
    log::debug!(
        "[KernelManager] Scanning cache generation {} (64bit host: {}, running: {})",
        cache.generation(),
        opts.host_is_64bit,
        opts.current_kernel
    );

    let mut kernels = Vec::new();
    for pkg in cache.packages()? {
        if is_64bit_arch(&pkg.architecture) != opts.host_is_64bit {
            continue;
        }
        if !is_kernel_image(&pkg.name, opts.max_kernel_major) {
            continue;
        }

        match kernel_record(pkg, &opts.current_kernel) {
            Ok(record) => kernels.push(record),
            Err(e) => log::debug!("[KernelManager] Skipping {}: {}", pkg.name, e),
        }
    }

    // Stable: equal versions keep cache order.
    kernels.sort_by(|a, b| compare_versions(&b.version, &a.version));

    log_info!(
        "[KernelManager] Kernel scan complete: {} kernel packages found",
        kernels.len()
    );
    Ok(kernels)
}

/// Summarize records per major series, newest series first.
pub fn group_kernels(records: &[KernelRecord]) -> Vec<KernelGroup> {
    let mut groups: Vec<KernelGroup> = Vec::new();

    for record in records {
        let idx = match groups.iter().position(|g| g.version_major == record.version_major) {
            Some(idx) => idx,
            None => {
                groups.push(KernelGroup {
                    version_major: record.version_major.clone(),
                    available: 0,
                    downloaded: 0,
                    installed: 0,
                    has_active: false,
                    origins: record.origins_display(),
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[idx];
        group.available += 1;
        group.downloaded += usize::from(record.downloaded);
        group.installed += usize::from(record.installed);
        group.has_active |= record.active;
    }

    groups.sort_by(|a, b| compare_versions(&b.version_major, &a.version_major));
    groups
}

/// Bytes taken by kernels on disk: installed size for installed kernels,
/// package size for kernels that are only downloaded.
pub fn occupied_space(records: &[KernelRecord]) -> u64 {
    records
        .iter()
        .map(|k| {
            if k.installed {
                k.installed_size
            } else if k.downloaded {
                k.size
            } else {
                0
            }
        })
        .sum()
}

/// Session-level entry point: scans, filters and acts on kernels while
/// keeping the cache snapshot in sync with the package database.
pub struct KernelManager<S: CacheSource> {
    session: CacheSession<S>,
    installer: Box<dyn PackageInstaller>,
    scan: ScanOptions,
    selection: PackageSelection,
}

impl<S: CacheSource> KernelManager<S> {
    pub fn new(
        session: CacheSession<S>,
        installer: Box<dyn PackageInstaller>,
        scan: ScanOptions,
        selection: PackageSelection,
    ) -> Self {
        KernelManager {
            session,
            installer,
            scan,
            selection,
        }
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.session.snapshot()
    }

    pub fn scan_options(&self) -> &ScanOptions {
        &self.scan
    }

    /// All kernels of the current snapshot.
    pub fn kernels(&self) -> Result<Vec<KernelRecord>, ScanError> {
        self.kernels_in(&self.session.snapshot())
    }

    /// All kernels of `snapshot`; fails if the snapshot predates the last reopen.
    pub fn kernels_in(&self, snapshot: &CacheSnapshot) -> Result<Vec<KernelRecord>, ScanError> {
        self.session.ensure_current(snapshot)?;
        get_kernels(snapshot, &self.scan)
    }

    /// Kernels of the current snapshot with the blacklist applied.
    pub fn filtered_kernels(&self, rules: &[BlacklistRule]) -> Result<Vec<KernelRecord>, ScanError> {
        Ok(apply_blacklist(self.kernels()?, rules))
    }

    /// Expand and submit a kernel action, then reopen the cache.
    pub fn perform(&mut self, fullnames: &[String], verb: Verb) -> Result<InstallerOutput, DispatchError> {
        let snapshot = self.session.snapshot();
        let result = perform_kernels(
            &*snapshot,
            &*self.installer,
            fullnames,
            verb,
            self.selection,
        );

        // Anything that reached the installer may have changed the database.
        if !matches!(
            result,
            Err(DispatchError::EmptyBatch) | Err(DispatchError::MalformedOperation(_))
        ) {
            if let Err(e) = self.session.reopen() {
                log::error!("[KernelManager] Cache reopen after {} failed: {}", verb, e);
            }
        }
        result
    }

    /// Refresh package lists through the installer and reopen the cache.
    pub fn refresh(&mut self) -> Result<Arc<CacheSnapshot>, RefreshError> {
        self.installer.refresh()?;
        Ok(self.session.reopen()?)
    }

    /// Reload the cache without touching the package lists.
    pub fn reopen(&mut self) -> Result<Arc<CacheSnapshot>, CacheError> {
        self.session.reopen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Origin, PackageVersion};

    fn ubuntu(archive: &str) -> Origin {
        Origin {
            label: "Ubuntu".to_string(),
            archive: archive.to_string(),
            site: "archive.ubuntu.com".to_string(),
            trusted: true,
        }
    }

    fn record(package: &str, major: &str, installed: bool, downloaded: bool, active: bool) -> KernelRecord {
        KernelRecord {
            package: package.to_string(),
            fullname: format!("{}:amd64", package),
            version: strip_kernel_version(package, DEFAULT_MAX_SUBVERSION),
            version_major: major.to_string(),
            pkg_version: String::new(),
            size: 100,
            installed_size: 1000,
            origins: Vec::new(),
            active,
            installed,
            downloaded,
        }
    }

    #[test]
    fn test_is_kernel_image_bounds() {
        assert!(is_kernel_image("linux-image-4.15.0-20-generic", 5));
        assert!(is_kernel_image("linux-image-5.4.0-90-generic", 5));
        assert!(!is_kernel_image("linux-image-6.2.0-26-generic", 5));
        assert!(is_kernel_image("linux-image-6.2.0-26-generic", 6));
        assert!(!is_kernel_image("linux-image-generic", 5));
        assert!(!is_kernel_image("linux-headers-4.15.0-20", 5));
        assert!(!is_kernel_image("linux-image-0.1.2", 5));
    }

    #[test]
    fn test_kernel_record_fields() {
        let pkg = Package::new("linux-image-4.15.0-20-generic", "amd64")
            .with_installed(PackageVersion::new("4.15.0-20.21").with_origin(Origin::local()))
            .with_candidate(
                PackageVersion::new("4.15.0-20.21")
                    .with_sizes(7_000_000, 21_000_000)
                    .with_origin(ubuntu("bionic"))
                    .with_origin(Origin::local()),
            );

        let rec = kernel_record(&pkg, "4.15.0-20-generic").unwrap();
        assert_eq!(rec.version, "4.15.0.20");
        assert_eq!(rec.version_major, "4.15");
        assert_eq!(rec.pkg_version, "4.15.0-20.21");
        assert_eq!(rec.size, 7_000_000);
        assert_eq!(rec.installed_size, 21_000_000);
        assert_eq!(rec.origins, vec!["Ubuntu (bionic, archive.ubuntu.com, trusted)"]);
        assert!(rec.active);
        assert!(rec.installed);
    }

    #[test]
    fn test_candidate_that_is_not_downloadable_leaves_pkg_version_empty() {
        let pkg = Package::new("linux-image-4.4.0-9-generic", "amd64")
            .with_config_files()
            .with_candidate(PackageVersion::new("4.4.0-9.24").with_origin(Origin::local()));

        let rec = kernel_record(&pkg, "unknown").unwrap();
        assert_eq!(rec.pkg_version, "");
        assert!(rec.downloaded);
        assert!(!rec.installed);
        assert!(rec.origins.is_empty());
    }

    #[test]
    fn test_kernel_record_rejects_short_versions() {
        let pkg = Package::new("linux-image-4.4-generic", "amd64");
        assert_eq!(
            kernel_record(&pkg, "unknown"),
            Err(ParseError::ShortVersion("linux-image-4.4-generic".to_string()))
        );
    }

    #[test]
    fn test_group_kernels_counts_and_orders() {
        let records = vec![
            record("linux-image-4.9.0-1-generic", "4.9", true, false, false),
            record("linux-image-4.10.0-28-generic", "4.10", true, false, true),
            record("linux-image-4.10.0-27-generic", "4.10", false, true, false),
            record("linux-image-4.10.0-26-generic", "4.10", false, false, false),
        ];

        let groups = group_kernels(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].version_major, "4.10");
        assert_eq!(groups[0].available, 3);
        assert_eq!(groups[0].installed, 1);
        assert_eq!(groups[0].downloaded, 1);
        assert!(groups[0].has_active);
        assert_eq!(groups[1].version_major, "4.9");
        assert!(!groups[1].has_active);
    }

    #[test]
    fn test_occupied_space() {
        let records = vec![
            record("linux-image-4.10.0-28-generic", "4.10", true, false, true),
            record("linux-image-4.10.0-27-generic", "4.10", false, true, false),
            record("linux-image-4.10.0-26-generic", "4.10", false, false, false),
        ];
        assert_eq!(occupied_space(&records), 1100);
    }
}
