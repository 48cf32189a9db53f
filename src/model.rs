//! Core data model shared by every pipeline stage: the crash-log file
//! handle, the parsed segment model, findings, and run-wide statistics.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A crash log discovered on disk. Identity is the absolute path; the line
/// sequence is loaded lazily by the Log File Source and retained for the
/// duration of a scan.
#[derive(Debug, Clone)]
pub struct CrashLogFile {
    pub path: PathBuf,
    pub lines: Vec<String>,
    pub size_bytes: u64,
}

impl CrashLogFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The six segments a crash log is split into, in their declared order.
/// Always exactly six entries; an empty `Vec` stands in for a segment whose
/// header was never found (segment totality invariant, spec §8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    pub crashgen_settings: Vec<String>,
    pub system_specs: Vec<String>,
    pub call_stack: Vec<String>,
    pub all_modules: Vec<String>,
    pub xse_modules: Vec<String>,
    pub plugins: Vec<String>,
}

impl Segments {
    /// Concatenation of the call stack lines, used by pattern matching that
    /// treats the segment as one blob (the Rule Engine's signal evaluation).
    pub fn call_stack_joined(&self) -> String {
        self.call_stack.join("\n")
    }
}

/// Insertion-ordered, case-insensitive-unique mapping from plugin filename
/// to its two-digit load-order index (or the `FE`/`FF` sentinels).
///
/// A bare `HashMap` would satisfy "mapping" but not the case-insensitive
/// uniqueness invariant from spec §3, and a bare `IndexMap<String, String>`
/// would preserve duplicates that only differ by case; this type enforces
/// both at the insertion boundary.
#[derive(Debug, Clone, Default)]
pub struct LoadedPlugins {
    by_name: IndexMap<String, String>,
    // lowercased name -> canonical (first-seen-case) name, for case-insensitive lookups
    canonical: IndexMap<String, String>,
}

impl LoadedPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a plugin. Returns `false` (no-op) if a case-insensitive
    /// duplicate is already present.
    pub fn insert(&mut self, name: impl Into<String>, index: impl Into<String>) -> bool {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        if self.canonical.contains_key(&key) {
            return false;
        }
        self.canonical.insert(key, name.clone());
        self.by_name.insert(name, index.into());
        true
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_name.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Case-insensitive exact lookup of a plugin's load-order index.
    pub fn index_of(&self, name: &str) -> Option<&str> {
        let key = name.to_ascii_lowercase();
        let canonical = self.canonical.get(&key)?;
        self.by_name.get(canonical).map(String::as_str)
    }

    /// Case-insensitive exact membership check.
    pub fn contains_exact(&self, name: &str) -> bool {
        self.canonical.contains_key(&name.to_ascii_lowercase())
    }

    /// Case-insensitive substring membership check in either direction:
    /// `name` may be a substring of a loaded plugin, or vice versa.
    pub fn contains_substring(&self, name: &str) -> bool {
        let needle = name.to_ascii_lowercase();
        self.canonical
            .keys()
            .any(|loaded| loaded.contains(&needle) || needle.contains(loaded.as_str()))
    }

    /// Find the plugin whose load-order index equals `prefix` (case-insensitive
    /// two-hex-digit comparison), used by the FormID Correlator.
    pub fn plugin_for_index(&self, prefix: &str) -> Option<&str> {
        self.by_name
            .iter()
            .find(|(_, idx)| idx.eq_ignore_ascii_case(prefix))
            .map(|(name, _)| name.as_str())
    }

    /// Number of plugins whose load-order index is not the `FE` light
    /// sentinel and whose extension is not `.esl`.
    pub fn full_count(&self) -> usize {
        self.by_name
            .iter()
            .filter(|(name, idx)| !is_light(name, idx))
            .count()
    }

    /// Number of plugins with the `FE` sentinel or `.esl` extension.
    pub fn light_count(&self) -> usize {
        self.by_name
            .iter()
            .filter(|(name, idx)| is_light(name, idx))
            .count()
    }
}

fn is_light(name: &str, index: &str) -> bool {
    index.eq_ignore_ascii_case("FE") || name.to_ascii_lowercase().ends_with(".esl")
}

/// Severity bucket used for report ordering and the "Move Unsolved Logs"
/// threshold check (spec §4.9: "no finding of severity >= Warning").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Suspect catalogs key rules by a raw numeral (`"5 | Null Memory Access"`).
    /// The scale historically used by these catalogs runs 1 (informational)
    /// through 6 (near-certain crash cause); this crate folds that onto the
    /// three-way `Severity` bucket used for aggregation and ordering. Numbers
    /// outside 1..=6 clamp to the nearest end.
    pub fn from_catalog_number(n: u8) -> Self {
        match n {
            0..=2 => Severity::Info,
            3..=4 => Severity::Warning,
            _ => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// One diagnostic produced by a detector.
#[derive(Debug, Clone)]
pub struct Finding {
    pub source_log: PathBuf,
    /// Stable identifier used to deduplicate findings within one log's report.
    pub issue_id: String,
    pub title: String,
    pub message: String,
    pub recommendation: Option<String>,
    pub severity: Severity,
    /// Raw catalog severity number (1-6), present only for suspect-catalog
    /// findings where the rendered title embeds it (spec §8 scenario 1).
    pub catalog_severity: Option<u8>,
    pub source_component: &'static str,
}

impl Finding {
    pub fn new(
        source_log: impl Into<PathBuf>,
        issue_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        source_component: &'static str,
    ) -> Self {
        Self {
            source_log: source_log.into(),
            issue_id: issue_id.into(),
            title: title.into(),
            message: message.into(),
            recommendation: None,
            severity,
            catalog_severity: None,
            source_component,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn with_catalog_severity(mut self, n: u8) -> Self {
        self.catalog_severity = Some(n);
        self
    }

    /// The fixed finding emitted when a crash log could not be read or was
    /// empty (spec §8 boundary: "Empty log -> one finding `Empty or
    /// inaccessible crash log file`, statistics `failed=1`").
    pub fn empty_log(source_log: impl Into<PathBuf>) -> Self {
        let source_log = source_log.into();
        let message = format!("{} could not be read or contained no usable content.", source_log.display());
        Finding::new(
            &source_log,
            "scheduler:empty-log",
            "Empty or inaccessible crash log file",
            message,
            Severity::Warning,
            "scheduler::failed",
        )
    }
}

/// Append-only findings collection for one log, enforcing the dedup-by-`issue_id`
/// invariant (spec §8: "for any two findings with identical issue_id on the
/// same log, only one appears in the final report").
#[derive(Debug, Default)]
pub struct FindingLog {
    findings: Vec<Finding>,
    seen_ids: HashSet<String>,
}

impl FindingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a finding, silently dropping it if its `issue_id` was already seen.
    pub fn push(&mut self, finding: Finding) {
        if self.seen_ids.insert(finding.issue_id.clone()) {
            self.findings.push(finding);
        }
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.push(finding);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn into_vec(self) -> Vec<Finding> {
        self.findings
    }
}

/// A fully parsed crash log.
#[derive(Debug, Clone)]
pub struct ParsedCrashLog {
    pub source_path: PathBuf,
    pub game_version: String,
    pub crashgen_name_and_version: String,
    pub main_error: String,
    pub segments: Segments,
    pub loaded_plugins: LoadedPlugins,
}

impl ParsedCrashLog {
    /// A log is "incomplete" if it has fewer than 20 lines or an empty
    /// `plugins` segment (spec §4.5 edge cases).
    pub fn is_incomplete(&self, total_lines: usize) -> bool {
        total_lines < 20 || self.segments.plugins.is_empty()
    }
}

/// Monotonically-aggregated counters across a batch (spec §3).
#[derive(Debug, Default, Clone)]
pub struct ScanStatistics {
    pub scanned: u64,
    pub failed: u64,
    pub incomplete: u64,
    pub solved: u64,
    pub failed_file_names: HashSet<String>,
}

impl ScanStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: ScanStatistics) {
        self.scanned += other.scanned;
        self.failed += other.failed;
        self.incomplete += other.incomplete;
        self.solved += other.solved;
        self.failed_file_names.extend(other.failed_file_names);
    }
}

/// Outcome of processing a single log end-to-end, the unit the Batch
/// Scheduler collects before folding into `ScanStatistics`. A plain
/// `Result<(), Error>` would lose the per-log findings in the error path,
/// so this distinguishes "parsed fine, no critical findings" from "parsed
/// fine, solved" from "failed to read" as three outcomes up front.
#[derive(Debug)]
pub enum ScanOutcome {
    /// The log was processed and a report written; `incomplete` mirrors
    /// `ParsedCrashLog::is_incomplete`.
    Processed {
        path: PathBuf,
        findings: Vec<Finding>,
        incomplete: bool,
        solved: bool,
    },
    /// The log could not be read or was empty/inaccessible. `findings`
    /// carries the rendered-and-written finding for that failure (empty
    /// on pure cancellation, where nothing is written at all).
    Failed { path: PathBuf, reason: String, findings: Vec<Finding> },
}

impl ScanOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ScanOutcome::Processed { path, .. } | ScanOutcome::Failed { path, .. } => path,
        }
    }
}
