//! dpkg/apt backed package cache
//!
//! Reads the dpkg status database for installation state and the downloaded
//! apt package lists for available versions. Origins are resolved from the
//! `Release`/`InRelease` file that belongs to each list.

use super::control::{parse_stanzas, strip_pgp_armor, Stanza};
use super::{CacheSource, Origin, Package, PackageVersion};
use crate::error::CacheError;
use crate::kernel::debversion::compare_deb_versions;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATUS_PATH: &str = "/var/lib/dpkg/status";
pub const DEFAULT_LISTS_DIR: &str = "/var/lib/apt/lists";

/// Package cache loaded from `/var/lib/dpkg/status` and `/var/lib/apt/lists`.
#[derive(Debug, Clone)]
pub struct AptListsSource {
    status_path: PathBuf,
    lists_dir: PathBuf,
    native_arch: String,
}

impl AptListsSource {
    pub fn new(
        status_path: impl Into<PathBuf>,
        lists_dir: impl Into<PathBuf>,
        native_arch: impl Into<String>,
    ) -> Self {
        AptListsSource {
            status_path: status_path.into(),
            lists_dir: lists_dir.into(),
            native_arch: native_arch.into(),
        }
    }

    /// System default locations and the host architecture.
    pub fn system() -> Self {
        AptListsSource::new(
            DEFAULT_STATUS_PATH,
            DEFAULT_LISTS_DIR,
            crate::system::debian_arch(),
        )
    }
}

/// dpkg view of one package.
struct StatusEntry {
    state: String,
    version: String,
    installed_size: u64,
}

#[derive(Default)]
struct PackageBuilder {
    status: Option<StatusEntry>,
    available: Vec<PackageVersion>,
}

impl PackageBuilder {
    fn add_available(&mut self, version: PackageVersion) {
        match self.available.iter().position(|v| v.version == version.version) {
            Some(idx) => {
                let existing = &mut self.available[idx];
                for origin in version.origins {
                    if !existing.origins.contains(&origin) {
                        existing.origins.push(origin);
                    }
                }
                existing.downloadable |= version.downloadable;
            }
            None => self.available.push(version),
        }
    }

    fn build(self, name: String, architecture: String) -> Package {
        let mut pkg = Package::new(name, architecture);
        let mut versions = self.available;

        if let Some(status) = self.status {
            pkg.has_config_files = status.state == "config-files";
            let is_installed = !matches!(status.state.as_str(), "not-installed" | "config-files");

            if is_installed {
                let installed = match versions.iter().position(|v| v.version == status.version) {
                    Some(idx) => {
                        versions[idx].origins.push(Origin::local());
                        versions[idx].clone()
                    }
                    None => {
                        let local = PackageVersion::new(status.version.clone())
                            .with_sizes(0, status.installed_size)
                            .with_origin(Origin::local());
                        versions.push(local.clone());
                        local
                    }
                };
                pkg = pkg.with_installed(installed);
            }
        }

        // TODO: honour apt pin priorities instead of always taking the newest version
        pkg.candidate = versions
            .into_iter()
            .max_by(|a, b| compare_deb_versions(&a.version, &b.version));
        pkg
    }
}

impl CacheSource for AptListsSource {
    fn load(&self) -> Result<Vec<Package>, CacheError> {
        let mut builders: HashMap<(String, String), PackageBuilder> = HashMap::new();

        let status_text =
            fs::read_to_string(&self.status_path).map_err(|source| CacheError::StatusUnreadable {
                path: self.status_path.clone(),
                source,
            })?;

        for stanza in parse_stanzas(&status_text) {
            let (Some(name), Some(arch)) = (stanza.get("Package"), stanza.get("Architecture")) else {
                continue;
            };
            let state = stanza
                .get("Status")
                .and_then(|s| s.split_whitespace().nth(2))
                .unwrap_or("not-installed")
                .to_string();
            let entry = StatusEntry {
                state,
                version: stanza.get("Version").unwrap_or_default().to_string(),
                installed_size: stanza.get_u64("Installed-Size").unwrap_or(0).saturating_mul(1024),
            };
            builders
                .entry((name.to_string(), arch.to_string()))
                .or_default()
                .status = Some(entry);
        }

        let mut origin_cache: HashMap<String, Origin> = HashMap::new();
        for list in self.package_lists()? {
            let file_name = match list.file_name().and_then(|f| f.to_str()) {
                Some(f) => f.to_string(),
                None => continue,
            };
            let text = match fs::read_to_string(&list) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("[Cache] Skipping unreadable list {}: {}", list.display(), e);
                    continue;
                }
            };

            let origin = origin_cache
                .entry(release_prefix(&file_name))
                .or_insert_with(|| list_origin(&self.lists_dir, &file_name))
                .clone();

            for stanza in parse_stanzas(&text) {
                if let Some((key, version)) = available_version(&stanza, &origin) {
                    builders.entry(key).or_default().add_available(version);
                }
            }
        }

        let packages: Vec<Package> = builders
            .into_iter()
            .map(|((name, arch), builder)| builder.build(name, arch))
            .collect();

        log::debug!(
            "[Cache] Loaded {} packages from {} and {}",
            packages.len(),
            self.status_path.display(),
            self.lists_dir.display()
        );
        Ok(packages)
    }

    fn native_arch(&self) -> String {
        self.native_arch.clone()
    }
}

impl AptListsSource {
    fn package_lists(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match fs::read_dir(&self.lists_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("[Cache] No package lists at {}", self.lists_dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CacheError::ListsUnreadable {
                    path: self.lists_dir.clone(),
                    source,
                })
            }
        };

        let mut lists: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|f| f.to_str())
                    .map_or(false, |f| f.ends_with("_Packages"))
            })
            .collect();
        lists.sort();
        Ok(lists)
    }
}

fn available_version(stanza: &Stanza, origin: &Origin) -> Option<((String, String), PackageVersion)> {
    let name = stanza.get("Package")?;
    let arch = stanza.get("Architecture")?;
    let version = stanza.get("Version")?;

    let pkg_version = PackageVersion::new(version)
        .with_sizes(
            stanza.get_u64("Size").unwrap_or(0),
            stanza.get_u64("Installed-Size").unwrap_or(0).saturating_mul(1024),
        )
        .with_source(
            stanza.get("Source").unwrap_or_default(),
            stanza.get("Section").unwrap_or_default(),
        )
        .with_origin(origin.clone());

    Some(((name.to_string(), arch.to_string()), pkg_version))
}

/// `host_path_dists_suite_` part of a list file name, shared with its Release file.
fn release_prefix(list_file: &str) -> String {
    match list_file.split_once("_dists_") {
        Some((repo, rest)) => {
            let suite = rest.split('_').next().unwrap_or_default();
            format!("{}_dists_{}_", repo, suite)
        }
        None => list_file.trim_end_matches("Packages").to_string(),
    }
}

/// Resolve the origin of a list file from its sibling Release file.
fn list_origin(lists_dir: &Path, list_file: &str) -> Origin {
    let prefix = release_prefix(list_file);
    let site = list_file.split('_').next().unwrap_or_default().to_string();
    let suite = list_file
        .split_once("_dists_")
        .and_then(|(_, rest)| rest.split('_').next())
        .unwrap_or_default()
        .to_string();

    let in_release = lists_dir.join(format!("{}InRelease", prefix));
    let release = lists_dir.join(format!("{}Release", prefix));
    let release_gpg = lists_dir.join(format!("{}Release.gpg", prefix));

    let trusted = in_release.exists() || release_gpg.exists();
    let text = fs::read_to_string(&in_release)
        .or_else(|_| fs::read_to_string(&release))
        .unwrap_or_default();
    let stanza = parse_stanzas(strip_pgp_armor(&text))
        .into_iter()
        .next()
        .unwrap_or_default();

    Origin {
        label: stanza.get("Label").unwrap_or_default().to_string(),
        archive: stanza.get("Suite").map(str::to_string).unwrap_or(suite),
        site,
        trusted,
    }
}
