//! Kernel support windows
//!
//! The support table lists, per origin and kernel series, the last month of
//! upstream support as `origin,version,month,year`. Entries are re-read on
//! every call and evaluated against the current month.

use crate::error::{ParseError, SupportError};
use crate::models::{SupportEntry, SupportStatus};
use chrono::Datelike;
use std::fs;
use std::path::Path;

/// Support table shipped with the crate.
pub const BUNDLED_SUPPORT_TABLE: &str = include_str!("../../data/kernel_support");

/// Months since year 0: `year * 12 + month`.
pub fn month_index(year: i64, month: i64) -> i64 {
    year * 12 + month
}

/// Month index of the local current date.
pub fn current_month_index() -> i64 {
    let today = chrono::Local::now().date_naive();
    month_index(i64::from(today.year()), i64::from(today.month()))
}

fn parse_int(value: &str, line: &str) -> Result<i64, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        value: value.to_string(),
        line: line.to_string(),
    })
}

fn parse_support_line(line: &str, now: i64) -> Result<SupportEntry, ParseError> {
    let fields: Vec<&str> = line.splitn(4, ',').collect();
    let [origin, version, month, rest] = fields[..] else {
        return Err(ParseError::SupportLine(line.to_string()));
    };

    // Anything after the year is ignored.
    let year = rest.split(',').next().unwrap_or(rest);
    let month = parse_int(month, line)?;
    let year = parse_int(year, line)?;

    Ok(SupportEntry {
        origin: origin.to_string(),
        version: version.to_string(),
        months_remaining: month_index(year, month) - now,
    })
}

/// Parse support table text relative to the month index `now`.
pub fn parse_support_table(text: &str, now: i64) -> Vec<SupportEntry> {
    text.lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match parse_support_line(line, now) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("[Support] Skipping line: {}", e);
                None
            }
        })
        .collect()
}

/// Read the support table at `path`, evaluated at month index `now`.
pub fn load_support_table(path: &Path, now: i64) -> Result<Vec<SupportEntry>, SupportError> {
    let text = fs::read_to_string(path).map_err(|source| SupportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = parse_support_table(&text, now);
    log::debug!("[Support] Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// The bundled support table, evaluated at month index `now`.
pub fn bundled_support_table(now: i64) -> Vec<SupportEntry> {
    parse_support_table(BUNDLED_SUPPORT_TABLE, now)
}

/// Support state of the series `version_major` whose members come from `origins`
/// (the joined origin descriptors of the group). When several entries match,
/// the last one in the table wins.
pub fn support_status(version_major: &str, origins: &str, entries: &[SupportEntry]) -> SupportStatus {
    entries
        .iter()
        .filter(|e| e.version == version_major)
        .filter(|e| origins.contains(&format!("{} ", e.origin)))
        .last()
        .map_or(SupportStatus::Unknown, |e| SupportStatus::from(e.months_remaining))
}
