//! Operation Dispatcher
//!
//! Expands kernel actions into the full set of packages that belong to a
//! kernel (image, modules, headers, extras), validates the batch and hands it
//! to a [`PackageInstaller`]. Also hosts the bulk plans (purge everything
//! old, remove or purge one series) and the per-kernel action guards.

use crate::cache::PackageCache;
use crate::error::DispatchError;
use crate::log_info;
use crate::models::{KernelRecord, Operation, Verb};
use crate::system::{InstallerOutput, PackageInstaller};
use once_cell::sync::Lazy;
use regex::Regex;

// Debian policy 5.6.1: lowercase alphanumerics plus `+ - .`, at least two characters.
static PACKAGE_NAME_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9+.\-]+$"));

const IMAGE_INFIX: &str = "-image-";

/// Which companion packages accompany a kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageSelection {
    pub include_headers: bool,
    pub include_extras: bool,
}

impl Default for PackageSelection {
    fn default() -> Self {
        PackageSelection {
            include_headers: true,
            include_extras: true,
        }
    }
}

/// Candidate package names belonging to the kernel image `image`, image first.
///
/// Names are derived by substitution only; whether they exist is up to the cache.
pub fn related_packages(image: &str, selection: PackageSelection) -> Vec<String> {
    let mut names = vec![image.to_string(), image.replace(IMAGE_INFIX, "-modules-")];
    if selection.include_headers {
        names.push(image.replace(IMAGE_INFIX, "-headers-"));
    }
    if selection.include_extras {
        names.push(image.replace(IMAGE_INFIX, "-image-extra-"));
        names.push(image.replace(IMAGE_INFIX, "-modules-extra-"));
    }
    names
}

/// Expand kernel fullnames into installer operations.
///
/// Unknown fullnames and companion packages missing from the cache are
/// dropped silently. A package is listed once even if requested twice.
pub fn expand_kernel_operations(
    cache: &dyn PackageCache,
    fullnames: &[String],
    verb: Verb,
    selection: PackageSelection,
) -> Vec<Operation> {
    let mut operations: Vec<Operation> = Vec::new();

    for fullname in fullnames {
        let Some(pkg) = cache.lookup(fullname) else {
            log::debug!("[Dispatcher] {} is not in the cache, skipping", fullname);
            continue;
        };

        for name in related_packages(&pkg.name, selection) {
            if !cache.contains(&name) {
                log::debug!("[Dispatcher] {} not available, not adding it", name);
                continue;
            }
            if operations.iter().any(|op| op.package == name) {
                continue;
            }
            operations.push(Operation::new(verb, name));
        }
    }

    operations
}

/// Build operations from raw `(verb, package)` pairs; unknown verbs are dropped.
pub fn parse_operations<'a, I>(pairs: I) -> Vec<Operation>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .filter_map(|(verb, package)| match verb.parse::<Verb>() {
            Ok(verb) => Some(Operation::new(verb, package)),
            Err(e) => {
                log::debug!("[Dispatcher] Dropping '{}': {}", package, e);
                None
            }
        })
        .collect()
}

/// Whether `name` is a well-formed Debian package name.
pub fn is_valid_package_name(name: &str) -> bool {
    match PACKAGE_NAME_REGEX.as_ref() {
        Ok(re) => re.is_match(name),
        Err(e) => {
            log::error!("[Dispatcher] Package name pattern failed to compile: {}", e);
            false
        }
    }
}

/// Reject empty batches and batches carrying names that are not package names.
pub fn validate_operations(operations: &[Operation]) -> Result<(), DispatchError> {
    if operations.is_empty() {
        return Err(DispatchError::EmptyBatch);
    }
    match operations.iter().find(|op| !is_valid_package_name(&op.package)) {
        Some(op) => Err(DispatchError::MalformedOperation(op.package.clone())),
        None => Ok(()),
    }
}

/// Validate and submit a batch; blocks until the installer exits.
pub fn submit_operations(
    installer: &dyn PackageInstaller,
    operations: &[Operation],
) -> Result<InstallerOutput, DispatchError> {
    validate_operations(operations)?;

    log_info!("[Dispatcher] Submitting {} package operations", operations.len());
    for op in operations {
        log::debug!("[Dispatcher]   {} {}", op.verb, op.package);
    }

    Ok(installer.submit(operations)?)
}

/// Expand `fullnames` with their companion packages and run `verb` on all of them.
pub fn perform_kernels(
    cache: &dyn PackageCache,
    installer: &dyn PackageInstaller,
    fullnames: &[String],
    verb: Verb,
    selection: PackageSelection,
) -> Result<InstallerOutput, DispatchError> {
    log_info!("[Dispatcher] {} requested for {}", verb, fullnames.join(", "));
    let operations = expand_kernel_operations(cache, fullnames, verb, selection);
    submit_operations(installer, &operations)
}

/// Integer status of a dispatch: 0 on success, negative error code otherwise.
pub fn status_code<T>(result: &Result<T, DispatchError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.status_code(),
    }
}

/// Whether `verb` makes sense for `record`.
///
/// Install only what is not installed; never remove or purge the running kernel.
pub fn action_allowed(record: &KernelRecord, verb: Verb) -> bool {
    match verb {
        Verb::Install => !record.installed,
        Verb::Remove => record.installed && !record.active,
        Verb::Purge => (record.installed || record.downloaded) && !record.active,
    }
}

fn plan<'a>(records: impl Iterator<Item = &'a KernelRecord>, verb: Verb) -> Vec<String> {
    records
        .filter(|k| action_allowed(k, verb))
        .map(|k| k.fullname.clone())
        .collect()
}

/// Every installed or downloaded kernel except the running one.
pub fn purge_all_plan(records: &[KernelRecord]) -> Vec<String> {
    plan(records.iter(), Verb::Purge)
}

/// Installed kernels of the series `major`, except the running one.
pub fn group_remove_plan(records: &[KernelRecord], major: &str) -> Vec<String> {
    plan(records.iter().filter(|k| k.version_major == major), Verb::Remove)
}

/// Installed or downloaded kernels of the series `major`, except the running one.
pub fn group_purge_plan(records: &[KernelRecord], major: &str) -> Vec<String> {
    plan(records.iter().filter(|k| k.version_major == major), Verb::Purge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSnapshot, Package};
    use crate::error::InstallerError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingInstaller {
        submitted: RefCell<Vec<Vec<Operation>>>,
        fail: bool,
    }

    impl PackageInstaller for RecordingInstaller {
        fn submit(&self, operations: &[Operation]) -> Result<InstallerOutput, InstallerError> {
            self.submitted.borrow_mut().push(operations.to_vec());
            if self.fail {
                return Err(InstallerError::ExitStatus {
                    cmd: "pkexec synaptic".to_string(),
                    code: Some(1),
                });
            }
            Ok(InstallerOutput::default())
        }

        fn refresh(&self) -> Result<InstallerOutput, InstallerError> {
            Ok(InstallerOutput::default())
        }
    }

    fn cache(names: &[&str]) -> CacheSnapshot {
        let packages = names.iter().map(|n| Package::new(*n, "amd64")).collect();
        CacheSnapshot::new(packages, "amd64", 1)
    }

    fn record(fullname: &str, installed: bool, downloaded: bool, active: bool) -> KernelRecord {
        let package = fullname.split(':').next().unwrap_or(fullname).to_string();
        KernelRecord {
            version_major: if package.contains("-4.4.") { "4.4" } else { "4.15" }.to_string(),
            package,
            fullname: fullname.to_string(),
            version: String::new(),
            pkg_version: String::new(),
            size: 0,
            installed_size: 0,
            origins: Vec::new(),
            active,
            installed,
            downloaded,
        }
    }

    #[test]
    fn test_related_packages_by_selection() {
        let image = "linux-image-4.15.0-20-generic";
        assert_eq!(
            related_packages(image, PackageSelection { include_headers: false, include_extras: false }),
            vec!["linux-image-4.15.0-20-generic", "linux-modules-4.15.0-20-generic"]
        );
        assert_eq!(
            related_packages(image, PackageSelection::default()),
            vec![
                "linux-image-4.15.0-20-generic",
                "linux-modules-4.15.0-20-generic",
                "linux-headers-4.15.0-20-generic",
                "linux-image-extra-4.15.0-20-generic",
                "linux-modules-extra-4.15.0-20-generic",
            ]
        );
    }

    #[test]
    fn test_missing_companions_are_dropped() {
        let cache = cache(&["linux-image-4.15.0-20-generic", "linux-modules-4.15.0-20-generic"]);
        let ops = expand_kernel_operations(
            &cache,
            &["linux-image-4.15.0-20-generic:amd64".to_string()],
            Verb::Install,
            PackageSelection { include_headers: true, include_extras: false },
        );
        assert_eq!(
            ops,
            vec![
                Operation::new(Verb::Install, "linux-image-4.15.0-20-generic"),
                Operation::new(Verb::Install, "linux-modules-4.15.0-20-generic"),
            ]
        );
    }

    #[test]
    fn test_unknown_fullname_and_duplicates() {
        let cache = cache(&["linux-image-4.15.0-20-generic"]);
        let ops = expand_kernel_operations(
            &cache,
            &[
                "linux-image-4.15.0-20-generic".to_string(),
                "linux-image-4.15.0-20-generic:amd64".to_string(),
                "linux-image-9.9.9-1-generic".to_string(),
            ],
            Verb::Purge,
            PackageSelection::default(),
        );
        assert_eq!(ops, vec![Operation::new(Verb::Purge, "linux-image-4.15.0-20-generic")]);
    }

    #[test]
    fn test_parse_operations_drops_unknown_verbs() {
        let ops = parse_operations(vec![
            ("install", "linux-image-4.15.0-20-generic"),
            ("upgrade", "linux-image-4.4.0-10-generic"),
            ("purge", "linux-modules-4.4.0-10-generic"),
        ]);
        assert_eq!(
            ops,
            vec![
                Operation::new(Verb::Install, "linux-image-4.15.0-20-generic"),
                Operation::new(Verb::Purge, "linux-modules-4.4.0-10-generic"),
            ]
        );
    }

    #[test]
    fn test_package_name_validation() {
        assert!(is_valid_package_name("linux-image-4.15.0-20-generic"));
        assert!(is_valid_package_name("g++"));
        assert!(!is_valid_package_name("linux-image-4.15; rm -rf /"));
        assert!(!is_valid_package_name("-o"));
        assert!(!is_valid_package_name("Linux"));
        assert!(!is_valid_package_name("a"));
    }

    #[test]
    fn test_status_codes() {
        let installer = RecordingInstaller::default();
        let cache = cache(&["linux-image-4.15.0-20-generic"]);

        let empty = perform_kernels(&cache, &installer, &[], Verb::Install, PackageSelection::default());
        assert_eq!(status_code(&empty), -1);

        let malformed = submit_operations(&installer, &[Operation::new(Verb::Remove, "bad name")]);
        assert_eq!(status_code(&malformed), -2);
        assert!(installer.submitted.borrow().is_empty());

        let ok = perform_kernels(
            &cache,
            &installer,
            &["linux-image-4.15.0-20-generic".to_string()],
            Verb::Install,
            PackageSelection::default(),
        );
        assert_eq!(status_code(&ok), 0);
        assert_eq!(installer.submitted.borrow().len(), 1);

        let failing = RecordingInstaller { fail: true, ..Default::default() };
        let failed = perform_kernels(
            &cache,
            &failing,
            &["linux-image-4.15.0-20-generic".to_string()],
            Verb::Install,
            PackageSelection::default(),
        );
        assert_eq!(status_code(&failed), -3);
    }

    #[test]
    fn test_action_guards() {
        let active = record("linux-image-4.15.0-20-generic:amd64", true, false, true);
        let installed = record("linux-image-4.15.0-19-generic:amd64", true, false, false);
        let downloaded = record("linux-image-4.15.0-18-generic:amd64", false, true, false);
        let available = record("linux-image-4.15.0-17-generic:amd64", false, false, false);

        assert!(!action_allowed(&active, Verb::Install));
        assert!(!action_allowed(&active, Verb::Remove));
        assert!(!action_allowed(&active, Verb::Purge));
        assert!(action_allowed(&installed, Verb::Remove));
        assert!(!action_allowed(&downloaded, Verb::Remove));
        assert!(action_allowed(&downloaded, Verb::Purge));
        assert!(action_allowed(&available, Verb::Install));
        assert!(!action_allowed(&available, Verb::Purge));
    }

    #[test]
    fn test_bulk_plans_never_touch_active_kernel() {
        let records = vec![
            record("linux-image-4.15.0-20-generic:amd64", true, false, true),
            record("linux-image-4.15.0-19-generic:amd64", true, false, false),
            record("linux-image-4.15.0-18-generic:amd64", false, true, false),
            record("linux-image-4.4.0-10-generic:amd64", true, false, false),
            record("linux-image-4.4.0-9-generic:amd64", false, false, false),
        ];

        assert_eq!(
            purge_all_plan(&records),
            vec![
                "linux-image-4.15.0-19-generic:amd64",
                "linux-image-4.15.0-18-generic:amd64",
                "linux-image-4.4.0-10-generic:amd64",
            ]
        );
        assert_eq!(group_remove_plan(&records, "4.15"), vec!["linux-image-4.15.0-19-generic:amd64"]);
        assert_eq!(
            group_purge_plan(&records, "4.15"),
            vec!["linux-image-4.15.0-19-generic:amd64", "linux-image-4.15.0-18-generic:amd64"]
        );
        assert_eq!(group_purge_plan(&records, "4.4"), vec!["linux-image-4.4.0-10-generic:amd64"]);
    }
}
