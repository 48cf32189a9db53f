//! Typed, named accessors over the Main and Game catalogs.
//!
//! Mirrors the teacher's `config::Config` shape: a read-only handle built
//! once and handed to every detector by reference (spec §9's "singleton
//! Configuration Store -> dependency-injected handle" redesign note). Every
//! accessor here degrades to an empty collection rather than propagating an
//! error, per spec §4.2 ("All accessors return empty collections rather
//! than failing").

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::config::{ConfigStore, DocumentKind};
use crate::rule_engine::SignalProgram;

/// A single-plugin or important-plugin note as stored in the catalogs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModNote {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    pub severity: u8,
    /// Present only on important-mod notes: suppress the "missing" finding
    /// when the installed GPU matches this rival family (`nvidia`/`amd`).
    #[serde(default, rename = "GpuRival")]
    pub gpu_rival: Option<String>,
}

/// A two-plugin conflict rule (spec §3 `ConflictRule`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConflictRule {
    pub plugin_a: String,
    pub plugin_b: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    pub severity: u8,
}

/// Which crash-generator TOML the recommended-values check is validating
/// (spec §4.2 `crashgen_recommendations(config_kind)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashgenKind {
    Buffout4,
    CrashLogger,
    EngineFixes,
}

impl CrashgenKind {
    fn catalog_key(self) -> &'static str {
        match self {
            CrashgenKind::Buffout4 => "Crashgen_Recommend.Buffout4",
            CrashgenKind::CrashLogger => "Crashgen_Recommend.CrashLogger",
            CrashgenKind::EngineFixes => "Crashgen_Recommend.EngineFixes",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RecommendedValue(String, String); // (expected_value, reason)

pub struct KnowledgeBase<'a> {
    store: &'a ConfigStore,
}

impl<'a> KnowledgeBase<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    /// Ordered list of `(severity_and_name, needle)` main-error signatures.
    pub fn suspects_main_error(&self) -> Vec<(String, String)> {
        self.store
            .get::<indexmap::IndexMap<String, String>>(DocumentKind::Main, "Suspects_Main_Error")
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Ordered list of `(severity_and_name, signal_program)` call-stack rules.
    pub fn suspects_call_stack(&self) -> Vec<(String, SignalProgram)> {
        let raw: indexmap::IndexMap<String, Vec<String>> = self
            .store
            .get(DocumentKind::Main, "Suspects_Call_Stack")
            .unwrap_or_default();
        raw.into_iter()
            .map(|(name, signals)| (name, SignalProgram::parse(&signals)))
            .collect()
    }

    /// Map from plugin-name fingerprint to a single-plugin note.
    pub fn mods_single(&self) -> HashMap<String, ModNote> {
        self.store.get(DocumentKind::Main, "Mods_Single").unwrap_or_default()
    }

    /// Two-plugin conflict rules.
    pub fn mods_conflict(&self) -> Vec<ConflictRule> {
        self.store.get(DocumentKind::Main, "Mods_Conflict").unwrap_or_default()
    }

    /// Important-plugin notes for the base game edition.
    pub fn mods_important_core(&self) -> HashMap<String, ModNote> {
        self.store.get(DocumentKind::Game, "Mods_Important_Core").unwrap_or_default()
    }

    /// Important-plugin notes for the Fallout: London total conversion.
    pub fn mods_important_folon(&self) -> HashMap<String, ModNote> {
        self.store.get(DocumentKind::Game, "Mods_Important_Folon").unwrap_or_default()
    }

    /// Substrings that mark a call-stack line as a named record of interest.
    pub fn records_of_interest(&self) -> HashSet<String> {
        self.store.get(DocumentKind::Main, "Records_Of_Interest").unwrap_or_default()
    }

    /// Substrings that veto an otherwise-matching named-record line.
    pub fn records_ignored(&self) -> HashSet<String> {
        self.store.get(DocumentKind::Main, "Records_Ignored").unwrap_or_default()
    }

    /// Per-game plugin names to skip during call-stack matching.
    pub fn plugins_ignored(&self) -> HashSet<String> {
        self.store.get(DocumentKind::Game, "Plugins_Ignore").unwrap_or_default()
    }

    /// Lines that should be stripped from a crash log during reformat
    /// (spec §4.4), e.g. lines that only add noise to the report.
    pub fn exclude_log_records(&self) -> Vec<String> {
        self.store.get(DocumentKind::Main, "Exclude_Log_Records").unwrap_or_default()
    }

    /// Filenames of known copies of script-extender DLLs that sometimes end
    /// up loose under `Scripts/` (spec §4.11).
    pub fn xse_hashed_scripts(&self) -> HashSet<String> {
        self.store.get(DocumentKind::Main, "XSE_HashedScripts").unwrap_or_default()
    }

    /// Substrings that mark a non-crash log line as worth flagging (spec §4.12).
    pub fn catch_log_errors(&self) -> Vec<String> {
        self.store.get(DocumentKind::Settings, "Catch_Log_Errors").unwrap_or_default()
    }

    /// Substrings that veto an otherwise-matching log-error line.
    pub fn exclude_log_errors(&self) -> Vec<String> {
        self.store.get(DocumentKind::Settings, "Exclude_Log_Errors").unwrap_or_default()
    }

    /// Path substrings that exempt a file from the Log-Error Scan entirely.
    pub fn exclude_log_files(&self) -> Vec<String> {
        self.store.get(DocumentKind::Settings, "Exclude_Log_Files").unwrap_or_default()
    }

    /// `"Section.Key" -> (expected_value, reason)` for the named crash
    /// generator's recommended TOML values.
    pub fn crashgen_recommendations(&self, kind: CrashgenKind) -> HashMap<String, (String, String)> {
        let raw: HashMap<String, RecommendedValue> =
            self.store.get(DocumentKind::Main, kind.catalog_key()).unwrap_or_default();
        raw.into_iter().map(|(k, RecommendedValue(value, reason))| (k, (value, reason))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store_with_main(dir: &std::path::Path, main_yaml: &str) -> ConfigStore {
        let mut f = std::fs::File::create(dir.join("Main.yaml")).unwrap();
        f.write_all(main_yaml.as_bytes()).unwrap();
        for kind in [DocumentKind::Game, DocumentKind::Settings, DocumentKind::GameLocal, DocumentKind::Ignore, DocumentKind::Test] {
            std::fs::write(dir.join(format!("{kind:?}.yaml")), "{}\n").unwrap();
        }
        ConfigStore::new(|kind| dir.join(format!("{kind:?}.yaml")))
    }

    #[test]
    fn missing_catalog_yields_empty_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_main(dir.path(), "{}\n");
        let kb = KnowledgeBase::new(&store);
        assert!(kb.suspects_main_error().is_empty());
        assert!(kb.mods_conflict().is_empty());
        assert!(kb.records_of_interest().is_empty());
    }

    #[test]
    fn suspects_main_error_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_main(
            dir.path(),
            "Suspects_Main_Error:\n  \"5 | Null Memory Access\": EXCEPTION_ACCESS_VIOLATION\n  \"3 | Stack Overflow\": EXCEPTION_STACK_OVERFLOW\n",
        );
        let kb = KnowledgeBase::new(&store);
        let suspects = kb.suspects_main_error();
        assert_eq!(suspects.len(), 2);
        assert_eq!(suspects[0].0, "5 | Null Memory Access");
        assert_eq!(suspects[1].0, "3 | Stack Overflow");
    }

    #[test]
    fn mods_conflict_deserializes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_main(
            dir.path(),
            "Mods_Conflict:\n  - PluginA: A.esp\n    PluginB: B.esp\n    Title: Conflict\n    Message: msg\n    Severity: 4\n",
        );
        let kb = KnowledgeBase::new(&store);
        let rules = kb.mods_conflict();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].plugin_a, "A.esp");
        assert_eq!(rules[0].severity, 4);
    }
}
