//! Bounded-parallel per-log execution: parse -> detect -> write, fanned
//! across a rayon thread pool with cooperative cancellation (spec §4.10).
//!
//! The parallel-fan-out-with-shared-accumulator shape is grounded in the
//! kind of `rayon` + `DashMap` pipeline a linter runs one rule pass per
//! file; the cancellation check cadence (between phases, not mid-phase)
//! follows the teacher's `fo4edit.rs` poll-with-deadline idiom, generalized
//! from "poll for a file" to "poll a shared cancellation flag".

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::cancellation::CancellationToken;
use crate::config::ConfigStore;
use crate::formid_index::FormIdIndex;
use crate::knowledge_base::KnowledgeBase;
use crate::log_source::LogFileSource;
use crate::model::{Finding, FindingLog, ScanOutcome, ScanStatistics};
use crate::{formid_correlator, mod_detector, report_writer, rule_engine, segment_parser};

/// Receives progress updates during a batch run. Percentages are
/// monotonically non-decreasing over the lifetime of one `run_batch` call.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, operation: &str, item: &str);
}

impl<F: Fn(u8, &str, &str) + Send + Sync> ProgressSink for F {
    fn report(&self, percent: u8, operation: &str, item: &str) {
        self(percent, operation, item)
    }
}

/// Settings relevant to the per-log pipeline, read once at batch start.
pub struct BatchOptions {
    pub xse_acronym: String,
    pub show_formid_values: bool,
    pub move_unsolved_logs: bool,
    pub fcx_mode: bool,
    /// Selects which of the FormID Index's per-edition tables to query
    /// (spec §4.3).
    pub game_edition: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            xse_acronym: "F4SE".to_string(),
            show_formid_values: true,
            move_unsolved_logs: false,
            fcx_mode: false,
            game_edition: "Fallout4".to_string(),
        }
    }
}

/// Run the full per-log pipeline over `log_paths`, bounded by rayon's
/// default thread-pool parallelism (the number of hardware threads).
///
/// Returns per-log outcomes (order matches `log_paths`) and the aggregated
/// `ScanStatistics`. Checked for cancellation between major phases of each
/// log's pipeline; a cancelled task is simply dropped from the result with
/// no report written.
pub fn run_batch(
    log_paths: &[PathBuf],
    source: &LogFileSource,
    store: &ConfigStore,
    formid_index: Option<&FormIdIndex>,
    options: &BatchOptions,
    cancellation: &CancellationToken,
    progress: Option<&dyn ProgressSink>,
) -> (Vec<ScanOutcome>, ScanStatistics) {
    let kb = KnowledgeBase::new(store);
    let exclude_log_records = kb.exclude_log_records();

    let completed = AtomicU64::new(0);
    let total = log_paths.len().max(1) as u64;
    let per_log_stats: DashMap<PathBuf, ScanStatistics> = DashMap::new();

    let outcomes: Vec<ScanOutcome> = log_paths
        .par_iter()
        .filter_map(|path| {
            if cancellation.is_cancelled() {
                return None;
            }

            let outcome = process_one_log(path, source, &kb, formid_index, options, &exclude_log_records, cancellation);


            let mut stats = ScanStatistics::new();
            match &outcome {
                ScanOutcome::Processed { incomplete, solved, .. } => {
                    stats.scanned = 1;
                    if *incomplete {
                        stats.incomplete = 1;
                    }
                    if *solved {
                        stats.solved = 1;
                    }
                }
                ScanOutcome::Failed { path, .. } => {
                    stats.scanned = 1;
                    stats.failed = 1;
                    stats.failed_file_names.insert(path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
                }
            }
            per_log_stats.insert(path.clone(), stats);

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            let percent = ((done * 100) / total).min(100) as u8;
            if let Some(sink) = progress {
                sink.report(percent, "scanning crash logs", &path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
            }

            Some(outcome)
        })
        .collect();

    let mut aggregate = ScanStatistics::new();
    for (_, stats) in per_log_stats.into_iter() {
        aggregate.merge(stats);
    }

    (outcomes, aggregate)
}

#[allow(clippy::too_many_arguments)]
fn process_one_log(
    path: &Path,
    source: &LogFileSource,
    kb: &KnowledgeBase<'_>,
    formid_index: Option<&FormIdIndex>,
    options: &BatchOptions,
    exclude_log_records: &[String],
    cancellation: &CancellationToken,
) -> ScanOutcome {
    let lines = match source.load_and_reformat(path, exclude_log_records) {
        Ok(lines) => lines,
        Err(_) => return failed_empty_log(path, options.fcx_mode),
    };

    if lines.is_empty() {
        return failed_empty_log(path, options.fcx_mode);
    }

    let parsed = segment_parser::parse(path, &lines, &options.xse_acronym);
    let incomplete = parsed.is_incomplete(lines.len());

    if cancellation.is_cancelled() {
        return ScanOutcome::Failed { path: path.to_path_buf(), reason: "cancelled".to_string(), findings: Vec::new() };
    }

    let mut findings = FindingLog::new();
    findings.extend(rule_engine::run_main_error_pass(&parsed, kb));
    findings.extend(rule_engine::run_call_stack_pass(&parsed, kb));
    findings.extend(rule_engine::run_named_record_pass(&parsed, kb));

    if cancellation.is_cancelled() {
        return ScanOutcome::Failed { path: path.to_path_buf(), reason: "cancelled".to_string(), findings: Vec::new() };
    }

    findings.extend(mod_detector::single_plugin_findings(&parsed, kb));
    findings.extend(mod_detector::conflict_findings(&parsed, kb));
    findings.extend(mod_detector::important_mod_findings(&parsed, kb));
    findings.extend(mod_detector::plugin_limit_findings(&parsed));
    findings.extend(formid_correlator::correlate(
        &parsed,
        formid_index,
        options.show_formid_values,
        &options.game_edition,
    ));

    if cancellation.is_cancelled() {
        return ScanOutcome::Failed { path: path.to_path_buf(), reason: "cancelled".to_string(), findings: Vec::new() };
    }

    let findings = findings.into_vec();
    let max_severity = findings.iter().map(|f| f.severity).max();
    let report_text = report_writer::render_log_report(path, &findings, options.fcx_mode, Utc::now(), false);
    let _ = report_writer::write_log_report(path, &report_text);
    let solved = report_writer::relocate_if_unsolved(path, max_severity, options.move_unsolved_logs).unwrap_or(false);

    ScanOutcome::Processed { path: path.to_path_buf(), findings, incomplete, solved }
}

/// Build, render, and write the fixed "empty or inaccessible crash log
/// file" report for a log that could not be read or had no lines at all
/// (spec §8 boundary), then return the corresponding `Failed` outcome.
fn failed_empty_log(path: &Path, fcx_mode: bool) -> ScanOutcome {
    let finding = Finding::empty_log(path);
    let findings = vec![finding];
    let report_text = report_writer::render_log_report(path, &findings, fcx_mode, Utc::now(), false);
    let _ = report_writer::write_log_report(path, &report_text);
    ScanOutcome::Failed { path: path.to_path_buf(), reason: "empty or inaccessible crash log file".to_string(), findings }
}
