//! Debian control file (deb822) parsing.

use crate::error::ParseError;
use std::collections::HashMap;

/// One paragraph of a control file; field names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stanza {
    fields: HashMap<String, String>,
}

impl Stanza {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(&field.to_ascii_lowercase()).map(String::as_str)
    }

    /// Numeric field, `None` when absent or unparsable.
    pub fn get_u64(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(|v| v.trim().parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split control text into stanzas.
///
/// Continuation lines are appended to the previous field. Lines that cannot be
/// attached to any field are skipped.
pub fn parse_stanzas(text: &str) -> Vec<Stanza> {
    let mut stanzas = Vec::new();
    let mut current = Stanza::default();
    let mut last_field: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
            last_field = None;
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            match last_field.as_ref().and_then(|f| current.fields.get_mut(f)) {
                Some(value) => {
                    value.push('\n');
                    value.push_str(line.trim());
                }
                None => log::debug!("[Control] {}", ParseError::ControlField(line.to_string())),
            }
            continue;
        }

        match line.split_once(':') {
            Some((name, value)) => {
                let name = name.trim().to_ascii_lowercase();
                current.fields.insert(name.clone(), value.trim().to_string());
                last_field = Some(name);
            }
            None => log::debug!("[Control] {}", ParseError::ControlField(line.to_string())),
        }
    }

    if !current.is_empty() {
        stanzas.push(current);
    }

    stanzas
}

/// Remove the OpenPGP clearsign wrapper of an `InRelease` file.
pub fn strip_pgp_armor(text: &str) -> &str {
    const HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
    const SIGNATURE: &str = "-----BEGIN PGP SIGNATURE-----";

    if !text.starts_with(HEADER) {
        return text;
    }

    // Armor headers end at the first blank line.
    let body_start = text
        .find("\n\n")
        .map(|idx| idx + 2)
        .unwrap_or(text.len());
    let body = &text[body_start..];
    match body.find(SIGNATURE) {
        Some(end) => &body[..end],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "\
Package: linux-image-4.15.0-20-generic
Status: install ok installed
Architecture: amd64
Version: 4.15.0-20.21
Description: Signed kernel image generic
 A kernel image for generic.

Package: linux-image-4.4.0-10-generic
Status: deinstall ok config-files
Architecture: amd64
Version: 4.4.0-10.25
";

    #[test]
    fn test_parse_stanzas_splits_paragraphs() {
        let stanzas = parse_stanzas(STATUS);
        assert_eq!(stanzas.len(), 2);
        assert_eq!(stanzas[0].get("Package"), Some("linux-image-4.15.0-20-generic"));
        assert_eq!(stanzas[1].get("status"), Some("deinstall ok config-files"));
    }

    #[test]
    fn test_continuation_lines_are_joined() {
        let stanzas = parse_stanzas(STATUS);
        assert_eq!(
            stanzas[0].get("Description"),
            Some("Signed kernel image generic\nA kernel image for generic.")
        );
    }

    #[test]
    fn test_strip_pgp_armor() {
        let signed = "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA512\n\nOrigin: Ubuntu\nLabel: Ubuntu\n-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----\n";
        let stanzas = parse_stanzas(strip_pgp_armor(signed));
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].get("Label"), Some("Ubuntu"));
        assert_eq!(strip_pgp_armor("Origin: Debian\n"), "Origin: Debian\n");
    }
}
