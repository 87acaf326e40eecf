//! Package changelog retrieval
//!
//! The installed documentation tree is read first. Kernels that are only
//! available from a repository fall back to the changelog server, which
//! publishes `changelog` files under the source package's pool path.

use crate::cache::{PackageCache, PackageVersion};
use crate::error::ChangelogError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

/// Default documentation root of installed packages.
pub const DEFAULT_DOC_ROOT: &str = "/usr/share/doc";

pub const DEFAULT_CHANGELOG_SERVER: &str = "http://changelogs.ubuntu.com/changelogs";
pub const DEFAULT_CHANGELOG_TIMEOUT_SECS: u64 = 10;

/// Changelog server reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChangelog {
    pub server: String,
    pub timeout: Duration,
}

impl RemoteChangelog {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        RemoteChangelog {
            server: server.into(),
            timeout,
        }
    }

    pub fn url(&self, package: &str, version: &PackageVersion) -> String {
        changelog_url(&self.server, package, version)
    }

    /// Download the changelog of `version` of `package`.
    pub fn fetch(&self, package: &str, version: &PackageVersion) -> Result<String, ChangelogError> {
        let url = self.url(package, version);
        log::debug!("[Changelog] Fetching: {}", url);

        let request_error = |source: reqwest::Error| ChangelogError::Request {
            url: url.clone(),
            source,
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(request_error)?;
        let response = client.get(&url).send().map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChangelogError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let text = response.text().map_err(request_error)?;
        log::debug!("[Changelog] Fetched {} bytes", text.len());
        Ok(text)
    }
}

/// `<server>/pool/<area>/<prefix>/<src>/<src>_<version>/changelog`
///
/// The source name and version come from the `Source` field when present.
/// The epoch is not part of the path, and `lib*` sources use a four letter prefix.
pub fn changelog_url(server: &str, package: &str, version: &PackageVersion) -> String {
    let (source, source_version) = source_of(package, version);
    let area = version
        .section
        .split_once('/')
        .map_or("main", |(area, _)| area);
    let prefix = if source.starts_with("lib") {
        source.get(..4).unwrap_or(source)
    } else {
        source.get(..1).unwrap_or(source)
    };
    let source_version = source_version
        .split_once(':')
        .map_or(source_version, |(_, v)| v);

    format!(
        "{}/pool/{}/{}/{}/{}_{}/changelog",
        server.trim_end_matches('/'),
        area,
        prefix,
        source,
        source,
        source_version
    )
}

fn source_of<'a>(package: &'a str, version: &'a PackageVersion) -> (&'a str, &'a str) {
    let source = version.source.trim();
    if source.is_empty() {
        return (package, version.version.as_str());
    }
    match source.split_once(' ') {
        Some((name, rest)) => (name, rest.trim().trim_start_matches('(').trim_end_matches(')')),
        None => (source, version.version.as_str()),
    }
}

/// Changelog of a cached package; empty if the package is unknown or no changelog could be found.
///
/// With `remote` set, a package without a local changelog is looked up on the
/// server for its candidate version.
pub fn kernel_changelog(
    cache: &dyn PackageCache,
    fullname: &str,
    doc_root: &Path,
    remote: Option<&RemoteChangelog>,
) -> String {
    let Some(pkg) = cache.lookup(fullname) else {
        log::debug!("[Changelog] {} is not in the cache", fullname);
        return String::new();
    };

    match read_changelog(doc_root, &pkg.name) {
        Ok(text) => return text,
        Err(e) => log::debug!("[Changelog] No local changelog for {}: {}", pkg.name, e),
    }

    let (Some(remote), Some(candidate)) = (remote, pkg.candidate.as_ref()) else {
        return String::new();
    };
    match remote.fetch(&pkg.name, candidate) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("[Changelog] {}", e);
            String::new()
        }
    }
}

/// Read `<doc_root>/<package>/changelog.Debian.gz`, falling back to the uncompressed file.
pub fn read_changelog(doc_root: &Path, package: &str) -> io::Result<String> {
    let dir = doc_root.join(package);
    let mut text = String::new();

    match File::open(dir.join("changelog.Debian.gz")) {
        Ok(file) => {
            GzDecoder::new(file).read_to_string(&mut text)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            File::open(dir.join("changelog.Debian"))?.read_to_string(&mut text)?;
        }
        Err(e) => return Err(e),
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSnapshot, Package};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const ENTRY: &str = "linux (4.15.0-20.21) bionic; urgency=medium\n\n  * Fix build.\n";

    fn write_gz(dir: &Path, package: &str, text: &str) {
        let pkg_dir = dir.join(package);
        std::fs::create_dir_all(&pkg_dir).unwrap();
        let file = File::create(pkg_dir.join("changelog.Debian.gz")).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn candidate_only_cache() -> CacheSnapshot {
        CacheSnapshot::new(
            vec![Package::new("linux-image-5.4.0-91-generic", "amd64").with_candidate(
                PackageVersion::new("5.4.0-91.102").with_source("linux-signed (5.4.0-91.102)", "kernel"),
            )],
            "amd64",
            1,
        )
    }

    #[test]
    fn test_changelog_is_decompressed() {
        let temp_dir = TempDir::new().unwrap();
        write_gz(temp_dir.path(), "linux-image-4.15.0-20-generic", ENTRY);

        let cache = CacheSnapshot::new(
            vec![Package::new("linux-image-4.15.0-20-generic", "amd64")],
            "amd64",
            1,
        );
        let text = kernel_changelog(&cache, "linux-image-4.15.0-20-generic:amd64", temp_dir.path(), None);
        assert_eq!(text, ENTRY);
    }

    #[test]
    fn test_unknown_package_has_empty_changelog() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CacheSnapshot::new(Vec::new(), "amd64", 1);
        assert!(kernel_changelog(&cache, "linux-image-4.4.0-10-generic", temp_dir.path(), None).is_empty());
    }

    #[test]
    fn test_plain_changelog_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let pkg_dir = temp_dir.path().join("linux-image-4.4.0-10-generic");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("changelog.Debian"), ENTRY).unwrap();

        assert_eq!(
            read_changelog(temp_dir.path(), "linux-image-4.4.0-10-generic").unwrap(),
            ENTRY
        );
    }

    #[test]
    fn test_changelog_url_layout() {
        let signed = PackageVersion::new("5.4.0-91.102").with_source("linux-signed (5.4.0-91.102)", "kernel");
        assert_eq!(
            changelog_url(DEFAULT_CHANGELOG_SERVER, "linux-image-5.4.0-91-generic", &signed),
            "http://changelogs.ubuntu.com/changelogs/pool/main/l/linux-signed/linux-signed_5.4.0-91.102/changelog"
        );

        let lib = PackageVersion::new("1:2.0-1").with_source("libfoo", "universe/libs");
        assert_eq!(
            changelog_url("http://example.org/", "libfoo1", &lib),
            "http://example.org/pool/universe/libf/libfoo/libfoo_2.0-1/changelog"
        );

        let bare = PackageVersion::new("4.4.0-10.25");
        assert_eq!(
            changelog_url("http://example.org", "linux-image-4.4.0-10-generic", &bare),
            "http://example.org/pool/main/l/linux-image-4.4.0-10-generic/linux-image-4.4.0-10-generic_4.4.0-10.25/changelog"
        );
    }

    #[test]
    fn test_candidate_only_kernel_uses_remote_changelog() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/pool/main/l/linux-signed/linux-signed_5.4.0-91.102/changelog")
            .with_status(200)
            .with_body(ENTRY)
            .create();

        let temp_dir = TempDir::new().unwrap();
        let remote = RemoteChangelog::new(server.url(), Duration::from_secs(5));
        let text = kernel_changelog(
            &candidate_only_cache(),
            "linux-image-5.4.0-91-generic",
            temp_dir.path(),
            Some(&remote),
        );

        mock.assert();
        assert_eq!(text, ENTRY);
    }

    #[test]
    fn test_candidate_only_kernel_without_remote_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let text = kernel_changelog(&candidate_only_cache(), "linux-image-5.4.0-91-generic", temp_dir.path(), None);
        assert!(text.is_empty());
    }

    #[test]
    fn test_local_changelog_wins_over_remote() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", mockito::Matcher::Any).expect(0).create();

        let temp_dir = TempDir::new().unwrap();
        write_gz(temp_dir.path(), "linux-image-5.4.0-91-generic", ENTRY);
        let remote = RemoteChangelog::new(server.url(), Duration::from_secs(5));
        let text = kernel_changelog(
            &candidate_only_cache(),
            "linux-image-5.4.0-91-generic",
            temp_dir.path(),
            Some(&remote),
        );

        mock.assert();
        assert_eq!(text, ENTRY);
    }

    #[test]
    fn test_missing_remote_changelog_reports_status() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", mockito::Matcher::Any).with_status(404).create();

        let remote = RemoteChangelog::new(server.url(), Duration::from_secs(5));
        let version = PackageVersion::new("5.4.0-91.102");
        match remote.fetch("linux-image-5.4.0-91-generic", &version) {
            Err(ChangelogError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected a status error, got {:?}", other),
        }
    }
}
