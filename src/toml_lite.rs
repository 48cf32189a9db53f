//! Minimal TOML/INI-ish parser for crash-generator settings files
//! (`Buffout4.toml`, `CrashLogger.toml`, `EngineFixes.toml`; spec §6).
//!
//! Supports `#`/`;` comments, `[section]` headers, and `key = value` lines;
//! values are trimmed of surrounding quotes. Generalizes the teacher's
//! `CKPEConfig` line scanner (section tracking, comment skipping,
//! `split('=').nth(1)` value extraction) from one hard-coded setting to an
//! arbitrary `Section.Key -> value` map.

use std::collections::BTreeMap;
use std::path::Path;

/// A parsed settings file: `"Section.Key" -> raw value text`.
#[derive(Debug, Clone, Default)]
pub struct TomlLite {
    values: BTreeMap<String, String>,
}

impl TomlLite {
    pub fn parse(content: &str) -> Self {
        let mut values = BTreeMap::new();
        let mut current_section = String::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current_section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else { continue };
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if key.is_empty() {
                continue;
            }

            let full_key = if current_section.is_empty() {
                key.to_string()
            } else {
                format!("{current_section}.{key}")
            };
            values.insert(full_key, value.to_string());
        }

        Self { values }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| crate::error::ScanError::io(path, e))?;
        Ok(Self::parse(&content))
    }

    pub fn get(&self, section_key: &str) -> Option<&str> {
        self.values.get(section_key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_strips_quotes() {
        let text = "# comment\n[Patches]\nMemoryManager = true\nArchiveLimit = \"false\"\n";
        let parsed = TomlLite::parse(text);
        assert_eq!(parsed.get("Patches.MemoryManager"), Some("true"));
        assert_eq!(parsed.get("Patches.ArchiveLimit"), Some("false"));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "; leading comment\n\n[Section]\n# another comment\nKey = Value\n";
        let parsed = TomlLite::parse(text);
        assert_eq!(parsed.get("Section.Key"), Some("Value"));
    }

    #[test]
    fn keys_before_any_section_have_no_prefix() {
        let text = "TopLevel = 1\n[Section]\nNested = 2\n";
        let parsed = TomlLite::parse(text);
        assert_eq!(parsed.get("TopLevel"), Some("1"));
        assert_eq!(parsed.get("Section.Nested"), Some("2"));
    }
}
