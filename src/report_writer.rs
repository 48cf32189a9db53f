//! Renders per-log Markdown reports and the aggregate run report
//! (spec §4.9).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::model::{Finding, ScanStatistics, Severity};
use crate::scanners::ScanReport;

const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

const HEADER_WARNING: &str =
    "# CLASSIC Crash Log Analysis\n\n\
\
This report lists *probable* causes, generated by pattern matching against a \
knowledge base of known issues. It is not a guarantee: treat every finding \
below as a lead to investigate, not a verdict.\n";

/// Render one log's findings into a Markdown report.
///
/// `findings` must already be grouped by `source_component` in declaration
/// order (the caller, the scheduler's per-log pipeline, owns that ordering);
/// this function only decides section headers and renders the fixed
/// sequence FCX checks -> main-error -> call-stack -> named-records ->
/// plugin-suspects -> FormIDs -> mod-detector -> important-mods ->
/// plugin-limits -> summary.
pub fn render_log_report(
    log_path: &Path,
    findings: &[Finding],
    fcx_mode: bool,
    analyzed_at: DateTime<Utc>,
    relocated_to_unsolved: bool,
) -> String {
    let mut out = String::new();
    out.push_str(HEADER_WARNING);
    out.push_str(&format!("\nTool version: {TOOL_VERSION}\n\n"));

    render_section(&mut out, "Scan Failure", findings, "scheduler::failed");

    if fcx_mode {
        out.push_str("## FCX Mode File Checks\n\n");
        out.push_str("_FCX Mode is enabled; see the game/mods scan report for file-level findings._\n\n");
    }

    render_section(&mut out, "Main Error Suspects", findings, "rule_engine::main_error");
    render_section(&mut out, "Call Stack Suspects", findings, "rule_engine::call_stack");
    render_section(&mut out, "Named Records", findings, "rule_engine::named_records");
    render_section(&mut out, "Plugin Suspects", findings, "mod_detector::single");
    render_section(&mut out, "FormIDs In Call Stack", findings, "formid_correlator");
    render_section(&mut out, "Plugin Conflicts", findings, "mod_detector::conflict");
    render_section(&mut out, "Important Mods", findings, "mod_detector::important");
    render_section(&mut out, "Plugin Counts", findings, "mod_detector::limits");

    out.push_str("## Summary\n\n");
    out.push_str(&format!("- Analyzed: {}\n", analyzed_at.to_rfc3339()));
    out.push_str(&format!("- Findings: {}\n", findings.len()));
    let max = findings.iter().map(|f| f.severity).max();
    out.push_str(&format!("- Highest severity: {}\n", max.map_or("None".to_string(), |s| s.to_string())));
    if relocated_to_unsolved {
        out.push_str("- No Warning-or-higher findings; log moved to `Unsolved Logs`.\n");
    }

    let _ = log_path;
    out
}

fn render_section(out: &mut String, title: &str, findings: &[Finding], component: &'static str) {
    let matching: Vec<&Finding> = findings.iter().filter(|f| f.source_component == component).collect();
    if matching.is_empty() {
        return;
    }

    out.push_str(&format!("## {title}\n\n"));
    for finding in matching {
        out.push_str(&format!("### {}\n\n", finding.title));
        out.push_str(&format!("{}\n\n", finding.message));
        if let Some(rec) = &finding.recommendation {
            out.push_str(&format!("**Recommendation:** {rec}\n\n"));
        }
    }
}

/// Write `report_text` to `<log_path>-AUTOSCAN.md`, next to the source log.
pub fn write_log_report(log_path: &Path, report_text: &str) -> anyhow::Result<PathBuf> {
    let mut target = log_path.as_os_str().to_os_string();
    target.push("-AUTOSCAN.md");
    let target = PathBuf::from(target);
    std::fs::write(&target, report_text).map_err(|e| crate::error::ScanError::io(&target, e))?;
    Ok(target)
}

/// If `should_move` (the "Move Unsolved Logs" setting) is set and `severity`
/// never reached Warning or above, copy `log_path` into a `Unsolved Logs`
/// subdirectory of its parent.
pub fn relocate_if_unsolved(log_path: &Path, max_severity: Option<Severity>, should_move: bool) -> anyhow::Result<bool> {
    let solved_enough = max_severity.is_none_or(|s| s < Severity::Warning);
    if !should_move || !solved_enough {
        return Ok(false);
    }

    let Some(parent) = log_path.parent() else { return Ok(false) };
    let dest_dir = parent.join("Unsolved Logs");
    std::fs::create_dir_all(&dest_dir).map_err(|e| crate::error::ScanError::io(&dest_dir, e))?;

    let Some(file_name) = log_path.file_name() else { return Ok(false) };
    let dest = dest_dir.join(file_name);
    std::fs::copy(log_path, &dest).map_err(|e| crate::error::ScanError::io(&dest, e))?;
    Ok(true)
}

/// Render the aggregate `CLASSIC Reports/CLASSIC_Report.md`, combining batch
/// statistics with the game/mods file-scan sections.
pub fn render_aggregate_report(stats: &ScanStatistics, game_scan: &ScanReport, mods_scan: &ScanReport) -> String {
    let mut out = String::new();
    out.push_str("# CLASSIC Aggregate Report\n\n");
    out.push_str("## Statistics\n\n");
    out.push_str(&format!("- Scanned: {}\n", stats.scanned));
    out.push_str(&format!("- Failed: {}\n", stats.failed));
    out.push_str(&format!("- Incomplete: {}\n", stats.incomplete));
    out.push_str(&format!("- Solved: {}\n", stats.solved));
    if !stats.failed_file_names.is_empty() {
        let mut names: Vec<&String> = stats.failed_file_names.iter().collect();
        names.sort();
        out.push_str("\n### Failed Files\n\n");
        for name in names {
            out.push_str(&format!("- {name}\n"));
        }
    }

    out.push_str("\n## Game Scan\n\n");
    render_scan_categories(&mut out, game_scan);
    out.push_str("\n## Mods Scan\n\n");
    render_scan_categories(&mut out, mods_scan);

    out
}

fn render_scan_categories(out: &mut String, report: &ScanReport) {
    for category in report.categories() {
        if category.is_empty() {
            continue;
        }
        out.push_str(&format!("### {}\n\n", category.title));
        for item in &category.items {
            out.push_str(&format!("- {item}\n"));
        }
        out.push('\n');
    }
}

/// Write the aggregate report to `<reports_dir>/CLASSIC Reports/CLASSIC_Report.md`.
pub fn write_aggregate_report(reports_root: &Path, text: &str) -> anyhow::Result<PathBuf> {
    let dir = reports_root.join("CLASSIC Reports");
    std::fs::create_dir_all(&dir).map_err(|e| crate::error::ScanError::io(&dir, e))?;
    let path = dir.join("CLASSIC_Report.md");
    std::fs::write(&path, text).map_err(|e| crate::error::ScanError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Finding;

    #[test]
    fn render_log_report_groups_by_component_in_fixed_order() {
        let findings = vec![
            Finding::new("x.log", "a", "Call Stack Hit", "msg", Severity::Warning, "rule_engine::call_stack"),
            Finding::new("x.log", "b", "Main Error Hit", "msg", Severity::Critical, "rule_engine::main_error"),
        ];
        let rendered = render_log_report(Path::new("x.log"), &findings, false, Utc::now(), false);
        let main_pos = rendered.find("Main Error Hit").unwrap();
        let call_pos = rendered.find("Call Stack Hit").unwrap();
        assert!(main_pos < call_pos, "main-error section must render before call-stack section");
    }

    #[test]
    fn relocate_skips_when_critical_finding_present() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("crash-1.log");
        std::fs::write(&log_path, "content").unwrap();

        let moved = relocate_if_unsolved(&log_path, Some(Severity::Critical), true).unwrap();
        assert!(!moved);
        assert!(!dir.path().join("Unsolved Logs").exists());
    }

    #[test]
    fn relocate_copies_when_no_warning_or_above() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("crash-2.log");
        std::fs::write(&log_path, "content").unwrap();

        let moved = relocate_if_unsolved(&log_path, Some(Severity::Info), true).unwrap();
        assert!(moved);
        assert!(dir.path().join("Unsolved Logs/crash-2.log").exists());
    }
}
