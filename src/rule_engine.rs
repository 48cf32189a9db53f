//! The suspect-signal-program interpreter: turns a `ParsedCrashLog` plus the
//! Knowledge Base's suspect catalogs into `Finding`s.
//!
//! The signal-tag design follows spec §9's explicit redesign note directly:
//! each raw catalog string becomes a small tagged value
//! (`Not|MeReq|MeOpt|Count(n)|Plain`) and the evaluator is a pure function
//! over a `ParsedCrashLog` and a `SignalProgram` — no interpreter state
//! survives between rules.

use std::collections::BTreeMap;

use crate::knowledge_base::KnowledgeBase;
use crate::model::{Finding, ParsedCrashLog, Severity};

/// One signal within a suspect call-stack rule (spec §3 `SuspectSignalProgram`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `NOT|<pattern>`: if `pattern` appears in the call stack, abort the
    /// whole rule regardless of other signals.
    Not(String),
    /// `ME-REQ|<pattern>`: `pattern` MUST appear in the main error.
    MeReq(String),
    /// `ME-OPT|<pattern>`: `pattern` may appear in the main error.
    MeOpt(String),
    /// `<N>|<pattern>` where `N` is a positive integer: `pattern` must
    /// occur at least `N` times in the call stack.
    Count(u32, String),
    /// Bare pattern (no `|`): must appear at least once in the call stack.
    Plain(String),
}

impl Signal {
    /// Parse one raw catalog signal string, e.g. `"NOT|ExcludedSymbol"` or
    /// `"2|BarFrame"` or a bare `"SomePattern"`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('|') {
            Some(("NOT", pattern)) => Signal::Not(pattern.to_string()),
            Some(("ME-REQ", pattern)) => Signal::MeReq(pattern.to_string()),
            Some(("ME-OPT", pattern)) => Signal::MeOpt(pattern.to_string()),
            Some((modifier, pattern)) => match modifier.parse::<u32>() {
                Ok(n) if n > 0 => Signal::Count(n, pattern.to_string()),
                _ => Signal::Plain(raw.to_string()),
            },
            None => Signal::Plain(raw.to_string()),
        }
    }
}

/// An ordered list of signals, evaluated together as one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalProgram(pub Vec<Signal>);

impl SignalProgram {
    pub fn parse(raw: &[String]) -> Self {
        Self(raw.iter().map(|s| Signal::parse(s)).collect())
    }

    /// Evaluate this program against `main_error` and `call_stack`, per
    /// spec §4.6's three-step evaluation semantics.
    pub fn fires(&self, main_error: &str, call_stack: &str) -> bool {
        let main_error_lower = main_error.to_ascii_lowercase();
        let call_stack_lower = call_stack.to_ascii_lowercase();

        let mut has_required = false;
        let mut error_req_found = false;
        let mut error_opt_found = false;
        let mut stack_found = false;

        for signal in &self.0 {
            match signal {
                Signal::Not(pattern) => {
                    if contains_ci(&call_stack_lower, pattern) {
                        return false;
                    }
                }
                Signal::MeReq(pattern) => {
                    has_required = true;
                    if contains_ci(&main_error_lower, pattern) {
                        error_req_found = true;
                    }
                }
                Signal::MeOpt(pattern) => {
                    if contains_ci(&main_error_lower, pattern) {
                        error_opt_found = true;
                    }
                }
                Signal::Count(n, pattern) => {
                    if count_occurrences_ci(&call_stack_lower, pattern) >= *n as usize {
                        stack_found = true;
                    }
                }
                Signal::Plain(pattern) => {
                    if contains_ci(&call_stack_lower, pattern) {
                        stack_found = true;
                    }
                }
            }
        }

        (!has_required || error_req_found) && (stack_found || error_opt_found)
    }
}

fn contains_ci(haystack_lower: &str, pattern: &str) -> bool {
    haystack_lower.contains(&pattern.to_ascii_lowercase())
}

fn count_occurrences_ci(haystack_lower: &str, pattern: &str) -> usize {
    let pattern_lower = pattern.to_ascii_lowercase();
    if pattern_lower.is_empty() {
        return 0;
    }
    haystack_lower.matches(&pattern_lower).count()
}

/// Left-pad `name` with `.` to width 40, matching the catalogs' rendered
/// title style (spec §8 scenario 1: `"Null Memory Access......................"`).
fn pad_title(name: &str) -> String {
    if name.len() >= 40 {
        name.to_string()
    } else {
        format!("{name}{}", ".".repeat(40 - name.len()))
    }
}

/// Split a catalog key of the form `"<severity> | <display name>"` into
/// its numeral and display name.
fn split_severity_and_name(key: &str) -> (u8, String) {
    match key.split_once('|') {
        Some((sev, name)) => {
            let sev = sev.trim().parse::<u8>().unwrap_or(0);
            (sev, name.trim().to_string())
        }
        None => (0, key.trim().to_string()),
    }
}

/// Run the main-error pass: one finding per catalog needle contained in the
/// log's main error line (spec §4.6).
pub fn run_main_error_pass(log: &ParsedCrashLog, kb: &KnowledgeBase<'_>) -> Vec<Finding> {
    let main_error_lower = log.main_error.to_ascii_lowercase();
    kb.suspects_main_error()
        .into_iter()
        .filter_map(|(key, needle)| {
            if contains_ci(&main_error_lower, &needle) {
                let (severity, name) = split_severity_and_name(&key);
                Some(
                    Finding::new(
                        &log.source_path,
                        format!("main-error:{key}"),
                        pad_title(&name),
                        format!("Main error contains \"{needle}\"."),
                        Severity::from_catalog_number(severity),
                        "rule_engine::main_error",
                    )
                    .with_catalog_severity(severity),
                )
            } else {
                None
            }
        })
        .collect()
}

/// Run the call-stack pass over every suspect signal program (spec §4.6).
pub fn run_call_stack_pass(log: &ParsedCrashLog, kb: &KnowledgeBase<'_>) -> Vec<Finding> {
    let call_stack = log.segments.call_stack_joined();
    kb.suspects_call_stack()
        .into_iter()
        .filter_map(|(key, program)| {
            if program.fires(&log.main_error, &call_stack) {
                let (severity, name) = split_severity_and_name(&key);
                Some(
                    Finding::new(
                        &log.source_path,
                        format!("call-stack:{key}"),
                        pad_title(&name),
                        format!("Call stack matched the \"{name}\" signal program."),
                        Severity::from_catalog_number(severity),
                        "rule_engine::call_stack",
                    )
                    .with_catalog_severity(severity),
                )
            } else {
                None
            }
        })
        .collect()
}

/// Run the named-record pass: group call-stack lines that mention a record
/// of interest (and no ignored substring) into one finding listing each
/// distinct extracted record with its occurrence count (spec §4.6).
pub fn run_named_record_pass(log: &ParsedCrashLog, kb: &KnowledgeBase<'_>) -> Option<Finding> {
    let of_interest = kb.records_of_interest();
    let ignored = kb.records_ignored();
    if of_interest.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();

    for line in &log.segments.call_stack {
        let lower = line.to_ascii_lowercase();
        let matches_interest = of_interest.iter().any(|needle| lower.contains(&needle.to_ascii_lowercase()));
        let matches_ignored = ignored.iter().any(|needle| lower.contains(&needle.to_ascii_lowercase()));
        if !matches_interest || matches_ignored {
            continue;
        }

        let extracted = if let Some(pos) = line.find("[RSP+") {
            line.get(pos + 30..).unwrap_or("").trim().to_string()
        } else {
            line.trim().to_string()
        };

        if extracted.is_empty() {
            continue;
        }

        *counts.entry(extracted).or_insert(0) += 1;
    }

    if counts.is_empty() {
        return None;
    }

    let message = counts
        .iter()
        .map(|(record, count)| format!("- {record} | {count}"))
        .collect::<Vec<_>>()
        .join("\n");

    Some(Finding::new(
        &log.source_path,
        "named-records",
        "Named Records Found In Call Stack",
        message,
        Severity::Info,
        "rule_engine::named_records",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(main_error: &str, call_stack: &[&str]) -> ParsedCrashLog {
        use crate::model::{LoadedPlugins, Segments};
        ParsedCrashLog {
            source_path: "test.log".into(),
            game_version: String::new(),
            crashgen_name_and_version: String::new(),
            main_error: main_error.to_string(),
            segments: Segments {
                call_stack: call_stack.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            loaded_plugins: LoadedPlugins::new(),
        }
    }

    #[test]
    fn signal_parse_modifiers() {
        assert_eq!(Signal::parse("NOT|Foo"), Signal::Not("Foo".into()));
        assert_eq!(Signal::parse("ME-REQ|Foo"), Signal::MeReq("Foo".into()));
        assert_eq!(Signal::parse("ME-OPT|Foo"), Signal::MeOpt("Foo".into()));
        assert_eq!(Signal::parse("2|Foo"), Signal::Count(2, "Foo".into()));
        assert_eq!(Signal::parse("Foo"), Signal::Plain("Foo".into()));
        // a malformed "modifier|pattern" where modifier isn't a recognized
        // tag or a positive integer falls back to the bare-pattern behavior
        assert_eq!(Signal::parse("0|Foo"), Signal::Plain("0|Foo".into()));
    }

    #[test]
    fn not_short_circuits_regardless_of_other_signals() {
        let program = SignalProgram::parse(&["NOT|ExcludedSymbol".into(), "2|BarFrame".into()]);
        let log = log_with("", &["BarFrame", "BarFrame", "ExcludedSymbol"]);
        assert!(!program.fires(&log.main_error, &log.segments.call_stack_joined()));
    }

    #[test]
    fn count_threshold_requires_at_least_n() {
        let program = SignalProgram::parse(&["NOT|ExcludedSymbol".into(), "2|BarFrame".into()]);
        let once = log_with("", &["BarFrame"]);
        assert!(!program.fires(&once.main_error, &once.segments.call_stack_joined()));

        let twice = log_with("", &["BarFrame", "BarFrame"]);
        assert!(program.fires(&twice.main_error, &twice.segments.call_stack_joined()));
    }

    #[test]
    fn me_req_conjunction() {
        let program = SignalProgram::parse(&["ME-REQ|NeedsThis".into(), "Plain".into()]);
        let missing_main_error = log_with("unrelated", &["Plain"]);
        assert!(!program.fires(&missing_main_error.main_error, &missing_main_error.segments.call_stack_joined()));

        let satisfied = log_with("contains NeedsThis here", &["Plain"]);
        assert!(program.fires(&satisfied.main_error, &satisfied.segments.call_stack_joined()));
    }

    #[test]
    fn main_error_needle_hit_renders_padded_title() {
        let dir = tempfile::tempdir().unwrap();
        for kind in crate::config::DocumentKind::ALL {
            std::fs::write(dir.path().join(format!("{kind:?}.yaml")), "{}\n").unwrap();
        }
        std::fs::write(
            dir.path().join("Main.yaml"),
            "Suspects_Main_Error:\n  \"5 | Null Memory Access\": EXCEPTION_ACCESS_VIOLATION\n",
        )
        .unwrap();
        let store = crate::config::ConfigStore::new(|kind| dir.path().join(format!("{kind:?}.yaml")));
        let kb = KnowledgeBase::new(&store);

        let log = log_with("Unhandled exception at 0x12345: EXCEPTION_ACCESS_VIOLATION", &[]);
        let findings = run_main_error_pass(&log, &kb);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Null Memory Access......................");
        assert_eq!(findings[0].catalog_severity, Some(5));
    }
}
