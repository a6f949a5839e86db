//! Ordered INI artifacts.
//!
//! systemd-networkd and `wg-quick` both read INI-style files where section
//! and key order matter (a `.network` file may repeat `[Route]`, a client
//! config lists `[Interface]` before `[Peer]`). [`Artifact`] keeps both orders
//! exactly as built or parsed and renders `Key=Value` lines with no padding
//! around the delimiter.

use std::fmt;

use crate::error::{NetworkdError, Result};

/// One `[Name]` section and its entries, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    /// Creates an empty section.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Appends an entry in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.entries.push((key.into(), value.to_string()));
    }

    /// Section name without brackets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entries in order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// The last value for `key` in this section.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An ordered sequence of sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    sections: Vec<Section>,
}

impl Artifact {
    /// Creates an empty artifact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a section.
    #[must_use]
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Sections in order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The first section called `name`.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// The last value of `key` in the first section called `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Like [`Artifact::get`] but reports a missing key as an error.
    pub fn require(&self, section: &str, key: &str) -> Result<&str> {
        self.get(section, key).ok_or_else(|| NetworkdError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Renders the artifact. Every section is followed by a blank line.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Parses artifact text.
    ///
    /// Blank lines and `#`/`;` comments are skipped and whitespace around
    /// `=` is trimmed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sections: Vec<Section> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let line_number = index + 1;

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| NetworkdError::Parse {
                    line: line_number,
                    message: format!("unterminated section header: {line}"),
                })?;
                sections.push(Section::new(name.trim()));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(NetworkdError::Parse {
                    line: line_number,
                    message: format!("invalid line format: {line}"),
                });
            };

            let Some(section) = sections.last_mut() else {
                return Err(NetworkdError::Parse {
                    line: line_number,
                    message: "key-value pair outside of section".to_string(),
                });
            };
            section.push(key.trim(), value.trim());
        }

        Ok(Self { sections })
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "{key}={value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Artifact {
        Artifact::new()
            .with_section(
                Section::new("NetDev")
                    .entry("Name", "wg0")
                    .entry("Kind", "wireguard"),
            )
            .with_section(Section::new("WireGuard").entry("ListenPort", 51820))
    }

    #[test]
    fn render_matches_networkd_style() {
        assert_eq!(
            sample().render(),
            "[NetDev]\nName=wg0\nKind=wireguard\n\n[WireGuard]\nListenPort=51820\n\n"
        );
    }

    #[test]
    fn parse_preserves_order() {
        let parsed = Artifact::parse(&sample().render()).expect("valid");
        assert_eq!(parsed, sample());
        let names: Vec<&str> = parsed.sections().iter().map(Section::name).collect();
        assert_eq!(names, ["NetDev", "WireGuard"]);
    }

    #[test]
    fn parse_tolerates_comments_and_spacing() {
        let text = "# generated\n; note\n[Peer]\nPublicKey = abc=\n\nAllowedIPs= 10.0.0.2/32\n";
        let parsed = Artifact::parse(text).expect("valid");
        assert_eq!(parsed.get("Peer", "PublicKey"), Some("abc="));
        assert_eq!(parsed.get("Peer", "AllowedIPs"), Some("10.0.0.2/32"));
    }

    #[test]
    fn value_keeps_trailing_base64_padding() {
        let text = "[WireGuard]\nPrivateKey=AAAA+/==\n";
        let parsed = Artifact::parse(text).expect("valid");
        assert_eq!(parsed.get("WireGuard", "PrivateKey"), Some("AAAA+/=="));
    }

    #[test]
    fn repeated_sections_are_kept() {
        let text = "[Route]\nGateway=10.0.0.1\n[Route]\nGateway=10.0.0.2\n";
        let parsed = Artifact::parse(text).expect("valid");
        assert_eq!(parsed.sections().len(), 2);
        assert_eq!(parsed.get("Route", "Gateway"), Some("10.0.0.1"));
    }

    #[test]
    fn last_value_wins_within_section() {
        let text = "[Network]\nAddress=10.0.0.1/24\nAddress=10.0.0.9/24\n";
        let parsed = Artifact::parse(text).expect("valid");
        assert_eq!(parsed.get("Network", "Address"), Some("10.0.0.9/24"));
    }

    #[test]
    fn key_outside_section_rejected() {
        let err = Artifact::parse("Name=wg0\n").expect_err("invalid");
        assert!(matches!(err, NetworkdError::Parse { line: 1, .. }));
    }

    #[test]
    fn line_without_delimiter_rejected() {
        let err = Artifact::parse("[NetDev]\nbogus\n").expect_err("invalid");
        assert!(matches!(err, NetworkdError::Parse { line: 2, .. }));
    }

    #[test]
    fn require_reports_missing_key() {
        let err = sample().require("WireGuard", "PrivateKey").expect_err("missing");
        assert_eq!(err.to_string(), "missing PrivateKey in [WireGuard]");
    }
}
