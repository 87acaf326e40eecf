//! Package cache access
//!
//! The kernel scan never reads ambient state: it works on a [`CacheSnapshot`]
//! handed out by a [`CacheSession`]. Every mutation of the system package
//! database (install, remove, list refresh) must be followed by
//! [`CacheSession::reopen`], which loads a fresh snapshot and bumps the
//! generation counter so stale snapshots can be detected.

pub mod apt;
pub mod control;

use crate::error::{CacheError, ScanError};
use std::collections::HashMap;
use std::sync::Arc;

pub use apt::AptListsSource;

/// Archive tag of the locally installed pseudo-origin.
pub const LOCAL_ARCHIVE: &str = "now";

/// Source repository descriptor of a package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub label: String,
    pub archive: String,
    pub site: String,
    pub trusted: bool,
}

impl Origin {
    /// The origin attached to an installed version that no repository offers.
    pub fn local() -> Self {
        Origin {
            label: String::new(),
            archive: LOCAL_ARCHIVE.to_string(),
            site: String::new(),
            trusted: false,
        }
    }

    pub fn is_local(&self) -> bool {
        self.archive == LOCAL_ARCHIVE
    }
}

/// One version of a package (installed or candidate).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageVersion {
    pub version: String,
    pub size: u64,
    pub installed_size: u64,
    pub downloadable: bool,
    pub origins: Vec<Origin>,
    /// `Source` field: source package name, optionally followed by `(version)`.
    pub source: String,
    /// Archive section, e.g. `main/kernel` or `kernel`.
    pub section: String,
}

impl PackageVersion {
    pub fn new(version: impl Into<String>) -> Self {
        PackageVersion {
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_sizes(mut self, size: u64, installed_size: u64) -> Self {
        self.size = size;
        self.installed_size = installed_size;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>, section: impl Into<String>) -> Self {
        self.source = source.into();
        self.section = section.into();
        self
    }

    /// Add a repository origin; any non-local origin makes the version downloadable.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        if !origin.is_local() {
            self.downloadable = true;
        }
        self.origins.push(origin);
        self
    }
}

/// A package as exposed by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub architecture: String,
    pub is_installed: bool,
    pub has_config_files: bool,
    pub installed: Option<PackageVersion>,
    pub candidate: Option<PackageVersion>,
}

impl Package {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            architecture: architecture.into(),
            is_installed: false,
            has_config_files: false,
            installed: None,
            candidate: None,
        }
    }

    /// `name:arch`
    pub fn fullname(&self) -> String {
        format!("{}:{}", self.name, self.architecture)
    }

    pub fn with_installed(mut self, version: PackageVersion) -> Self {
        self.is_installed = true;
        self.installed = Some(version);
        self
    }

    pub fn with_candidate(mut self, version: PackageVersion) -> Self {
        self.candidate = Some(version);
        self
    }

    pub fn with_config_files(mut self) -> Self {
        self.has_config_files = true;
        self
    }
}

/// Read access to a package cache.
pub trait PackageCache {
    /// Generation of the database state this cache reflects.
    fn generation(&self) -> u64;

    /// Every package in the cache.
    fn packages(&self) -> Result<Box<dyn Iterator<Item = &Package> + '_>, CacheError>;

    /// Look up by `name` (native architecture preferred) or `name:arch`.
    fn lookup(&self, name: &str) -> Option<&Package>;

    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

/// Immutable, in-memory view of the package database at one generation.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    generation: u64,
    native_arch: String,
    packages: Vec<Package>,
    by_fullname: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl CacheSnapshot {
    pub fn new(packages: Vec<Package>, native_arch: impl Into<String>, generation: u64) -> Self {
        let native_arch = native_arch.into();
        let mut by_fullname = HashMap::with_capacity(packages.len());
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(packages.len());

        for (idx, pkg) in packages.iter().enumerate() {
            by_fullname.insert(pkg.fullname(), idx);

            let replace = match by_name.get(&pkg.name) {
                None => true,
                Some(&existing) => {
                    packages[existing].architecture != native_arch && pkg.architecture == native_arch
                }
            };
            if replace {
                by_name.insert(pkg.name.clone(), idx);
            }
        }

        CacheSnapshot {
            generation,
            native_arch,
            packages,
            by_fullname,
            by_name,
        }
    }

    pub fn native_arch(&self) -> &str {
        &self.native_arch
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageCache for CacheSnapshot {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn packages(&self) -> Result<Box<dyn Iterator<Item = &Package> + '_>, CacheError> {
        Ok(Box::new(self.packages.iter()))
    }

    fn lookup(&self, name: &str) -> Option<&Package> {
        self.by_fullname
            .get(name)
            .or_else(|| self.by_name.get(name))
            .and_then(|&idx| self.packages.get(idx))
    }
}

/// Something that can load the package database.
pub trait CacheSource {
    fn load(&self) -> Result<Vec<Package>, CacheError>;

    /// Debian architecture tag of the host (e.g. `amd64`).
    fn native_arch(&self) -> String;
}

/// Owns a cache source and the snapshot currently considered valid.
pub struct CacheSession<S: CacheSource> {
    source: S,
    snapshot: Arc<CacheSnapshot>,
}

impl<S: CacheSource> CacheSession<S> {
    /// Load the first snapshot (generation 1).
    pub fn open(source: S) -> Result<Self, CacheError> {
        let packages = source.load()?;
        let snapshot = CacheSnapshot::new(packages, source.native_arch(), 1);
        log::info!(
            "[Cache] Opened package cache: {} packages (generation 1)",
            snapshot.len()
        );
        Ok(CacheSession {
            source,
            snapshot: Arc::new(snapshot),
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    /// Reload from the source. Required after anything that changed the package database.
    /// On failure the previous snapshot stays current.
    pub fn reopen(&mut self) -> Result<Arc<CacheSnapshot>, CacheError> {
        let generation = self.snapshot.generation + 1;
        let packages = self.source.load()?;
        self.snapshot = Arc::new(CacheSnapshot::new(packages, self.source.native_arch(), generation));
        log::info!(
            "[Cache] Reopened package cache: {} packages (generation {})",
            self.snapshot.len(),
            generation
        );
        Ok(self.snapshot())
    }

    pub fn is_current(&self, snapshot: &CacheSnapshot) -> bool {
        snapshot.generation == self.snapshot.generation
    }

    /// Reject snapshots taken before the last reopen.
    pub fn ensure_current(&self, snapshot: &CacheSnapshot) -> Result<(), ScanError> {
        if self.is_current(snapshot) {
            Ok(())
        } else {
            Err(ScanError::StaleSnapshot {
                snapshot: snapshot.generation,
                current: self.snapshot.generation,
            })
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// In-memory source, mostly useful for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pub packages: Vec<Package>,
    pub native_arch: String,
}

impl StaticSource {
    pub fn new(packages: Vec<Package>, native_arch: impl Into<String>) -> Self {
        StaticSource {
            packages,
            native_arch: native_arch.into(),
        }
    }
}

impl CacheSource for StaticSource {
    fn load(&self) -> Result<Vec<Package>, CacheError> {
        Ok(self.packages.clone())
    }

    fn native_arch(&self) -> String {
        self.native_arch.clone()
    }
}
