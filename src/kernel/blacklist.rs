//! Blacklist filtering of the kernel list
//!
//! A blacklist file holds one rule per line, `KEYWORD pattern`, separated by
//! the first space. `GROUP 4.4` hides the whole 4.4 series, `KERNEL <regex>`
//! hides packages whose name matches the regex at its start. The running
//! kernel is never hidden.

use crate::error::{BlacklistError, ParseError};
use crate::models::{BlacklistKeyword, BlacklistRule, KernelRecord};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Blacklist shipped with the crate; seeds the user file when the system default is missing.
pub const BUNDLED_DEFAULT_BLACKLIST: &str = include_str!("../../data/blacklist_default");

/// Parse blacklist text. Empty lines, `#` comments and lines without a space are dropped.
pub fn parse_blacklist(text: &str) -> Vec<BlacklistRule> {
    text.lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.split_once(' ') {
            Some((keyword, pattern)) => Some(BlacklistRule::new(keyword, pattern)),
            None => {
                log::debug!("[Blacklist] {}", ParseError::BlacklistLine(line.to_string()));
                None
            }
        })
        .collect()
}

/// Load the user blacklist, seeding it from the default blacklist on first use.
///
/// The default is copied verbatim once; later changes to it are not picked up.
pub fn load_blacklist(user_path: &Path, default_path: &Path) -> Result<Vec<BlacklistRule>, BlacklistError> {
    if !user_path.exists() {
        seed_user_blacklist(user_path, default_path)?;
    }

    let text = fs::read_to_string(user_path).map_err(|source| BlacklistError::Read {
        path: user_path.to_path_buf(),
        source,
    })?;

    let rules = parse_blacklist(&text);
    log::debug!(
        "[Blacklist] Loaded {} rules from {}",
        rules.len(),
        user_path.display()
    );
    Ok(rules)
}

fn seed_user_blacklist(user_path: &Path, default_path: &Path) -> Result<(), BlacklistError> {
    let seed_err = |source| BlacklistError::Seed {
        path: user_path.to_path_buf(),
        source,
    };

    let default_text = match fs::read_to_string(default_path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!(
                "[Blacklist] Default blacklist {} unreadable ({}), using bundled copy",
                default_path.display(),
                e
            );
            BUNDLED_DEFAULT_BLACKLIST.to_string()
        }
    };

    if let Some(parent) = user_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(seed_err)?;
        }
    }
    fs::write(user_path, default_text).map_err(seed_err)?;

    log::info!("[Blacklist] Seeded {} from defaults", user_path.display());
    Ok(())
}

/// A rule ready for evaluation; KERNEL patterns are compiled once.
enum Matcher<'a> {
    Group(&'a str),
    Kernel(Regex),
    Never,
}

impl<'a> Matcher<'a> {
    fn compile(rule: &'a BlacklistRule) -> Self {
        match &rule.keyword {
            BlacklistKeyword::Group => Matcher::Group(&rule.pattern),
            BlacklistKeyword::Kernel => match Regex::new(&format!("^(?:{})", rule.pattern)) {
                Ok(re) => Matcher::Kernel(re),
                Err(e) => {
                    log::warn!("[Blacklist] Ignoring invalid KERNEL pattern '{}': {}", rule.pattern, e);
                    Matcher::Never
                }
            },
            BlacklistKeyword::Unknown(_) => Matcher::Never,
        }
    }

    fn matches(&self, record: &KernelRecord) -> bool {
        match self {
            Matcher::Group(major) => *major == record.version_major,
            Matcher::Kernel(re) => re.is_match(&record.package),
            Matcher::Never => false,
        }
    }
}

/// Whether a single rule matches a record.
pub fn rule_matches(rule: &BlacklistRule, record: &KernelRecord) -> bool {
    Matcher::compile(rule).matches(record)
}

/// Drop every record matched by a rule, except the active kernel. Order is preserved.
pub fn apply_blacklist(records: Vec<KernelRecord>, rules: &[BlacklistRule]) -> Vec<KernelRecord> {
    let matchers: Vec<Matcher> = rules.iter().map(Matcher::compile).collect();

    records
        .into_iter()
        .filter(|record| {
            let hit = matchers.iter().position(|m| m.matches(record));
            match hit {
                Some(idx) if !record.active => {
                    log::debug!(
                        "[Blacklist] Eliminated {} with {} '{}'",
                        record.package,
                        rules[idx].keyword,
                        rules[idx].pattern
                    );
                    false
                }
                _ => true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(package: &str, major: &str, active: bool) -> KernelRecord {
        KernelRecord {
            package: package.to_string(),
            fullname: format!("{}:amd64", package),
            version: String::new(),
            version_major: major.to_string(),
            pkg_version: String::new(),
            size: 0,
            installed_size: 0,
            origins: Vec::new(),
            active,
            installed: active,
            downloaded: false,
        }
    }

    #[test]
    fn test_parse_blacklist_keeps_pattern_verbatim() {
        let rules = parse_blacklist("# comment\n\ngroup 4.4\nKERNEL linux-image-4\\.8 trailing\nnospace\n");
        assert_eq!(
            rules,
            vec![
                BlacklistRule::new(BlacklistKeyword::Group, "4.4"),
                BlacklistRule::new(BlacklistKeyword::Kernel, "linux-image-4\\.8 trailing"),
            ]
        );
    }

    #[test]
    fn test_group_rule_eliminates_matching_series() {
        let rules = vec![BlacklistRule::new("GROUP", "4.4")];
        let kept = apply_blacklist(
            vec![
                record("linux-image-4.4.0-10-generic", "4.4", false),
                record("linux-image-4.15.0-20-generic", "4.15", false),
            ],
            &rules,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version_major, "4.15");
    }

    #[test]
    fn test_group_rule_is_exact_match() {
        let rule = BlacklistRule::new("GROUP", "4.1");
        assert!(!rule_matches(&rule, &record("linux-image-4.15.0-20-generic", "4.15", false)));
    }

    #[test]
    fn test_kernel_rule_is_prefix_anchored() {
        let rule = BlacklistRule::new("KERNEL", "^linux-image-4\\.4\\.0-10");
        assert!(rule_matches(&rule, &record("linux-image-4.4.0-10-generic", "4.4", false)));

        let unanchored = BlacklistRule::new("KERNEL", "generic");
        assert!(!rule_matches(&unanchored, &record("linux-image-4.4.0-10-generic", "4.4", false)));
    }

    #[test]
    fn test_active_kernel_survives() {
        let rules = vec![
            BlacklistRule::new("GROUP", "4.4"),
            BlacklistRule::new("KERNEL", "linux-image"),
        ];
        let kept = apply_blacklist(vec![record("linux-image-4.4.0-10-generic", "4.4", true)], &rules);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_unknown_keyword_and_bad_regex_never_match() {
        let rec = record("linux-image-4.4.0-10-generic", "4.4", false);
        assert!(!rule_matches(&BlacklistRule::new("FLAVOR", "4.4"), &rec));
        assert!(!rule_matches(&BlacklistRule::new("KERNEL", "linux-image-(4"), &rec));
    }

    #[test]
    fn test_load_blacklist_seeds_user_file_once() {
        let temp_dir = TempDir::new().unwrap();
        let default_path = temp_dir.path().join("blacklist_default");
        let user_path = temp_dir.path().join("config").join("blacklist");
        fs::write(&default_path, "GROUP 4.4\n").unwrap();

        let rules = load_blacklist(&user_path, &default_path).unwrap();
        assert_eq!(rules, vec![BlacklistRule::new("GROUP", "4.4")]);
        assert_eq!(fs::read_to_string(&user_path).unwrap(), "GROUP 4.4\n");

        // Later default changes are not synced into the existing user file.
        fs::write(&default_path, "GROUP 4.8\n").unwrap();
        let rules = load_blacklist(&user_path, &default_path).unwrap();
        assert_eq!(rules, vec![BlacklistRule::new("GROUP", "4.4")]);
    }

    #[test]
    fn test_load_blacklist_falls_back_to_bundled_default() {
        let temp_dir = TempDir::new().unwrap();
        let user_path = temp_dir.path().join("blacklist");
        let rules = load_blacklist(&user_path, &temp_dir.path().join("missing")).unwrap();
        assert_eq!(rules, parse_blacklist(BUNDLED_DEFAULT_BLACKLIST));
    }
}
