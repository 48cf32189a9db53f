//! Validates an installed crash-generator's TOML settings against the
//! Knowledge Base's recommended values (spec §4.2 `crashgen_recommendations`,
//! §6 TOML inputs).

use std::path::Path;

use crate::knowledge_base::{CrashgenKind, KnowledgeBase};
use crate::model::{Finding, Severity};
use crate::toml_lite::TomlLite;

/// Compare `config`'s values against the recommended settings for `kind`,
/// emitting one finding per mismatch (including a setting recommended but
/// absent from the file).
pub fn check(config_path: &Path, kind: CrashgenKind, kb: &KnowledgeBase<'_>) -> anyhow::Result<Vec<Finding>> {
    let config = TomlLite::from_file(config_path)?;
    let recommendations = kb.crashgen_recommendations(kind);

    let mut findings = Vec::new();
    for (section_key, (expected, reason)) in recommendations {
        let actual = config.get(&section_key);
        let matches = actual.is_some_and(|v| v.eq_ignore_ascii_case(&expected));
        if matches {
            continue;
        }

        let actual_display = actual.unwrap_or("(not set)");
        findings.push(Finding::new(
            config_path,
            format!("crashgen-setting:{section_key}"),
            format!("{section_key} Is Not Set To The Recommended Value"),
            format!("Current: {actual_display}, recommended: {expected}. {reason}"),
            Severity::Warning,
            "crashgen_check",
        ));
    }

    findings.sort_by(|a, b| a.issue_id.cmp(&b.issue_id));
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, DocumentKind};

    #[test]
    fn flags_mismatched_and_missing_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Main.yaml"),
            "Crashgen_Recommend.Buffout4:\n  Patches.MemoryManager: [\"true\", \"prevents OOM crashes\"]\n  Patches.ArchiveLimit: [\"false\", \"disable the archive limit\"]\n",
        )
        .unwrap();
        for kind in [DocumentKind::Game, DocumentKind::Settings, DocumentKind::GameLocal, DocumentKind::Ignore, DocumentKind::Test] {
            std::fs::write(dir.path().join(format!("{kind:?}.yaml")), "{}\n").unwrap();
        }
        let store = ConfigStore::new(|kind| dir.path().join(format!("{kind:?}.yaml")));
        let kb = KnowledgeBase::new(&store);

        let config_path = dir.path().join("Buffout4.toml");
        std::fs::write(&config_path, "[Patches]\nMemoryManager = false\n").unwrap();

        let findings = check(&config_path, CrashgenKind::Buffout4, &kb).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().any(|f| f.issue_id == "crashgen-setting:Patches.MemoryManager"));
        assert!(findings.iter().any(|f| f.issue_id == "crashgen-setting:Patches.ArchiveLimit"));
    }
}
