//! Crash log analysis and mod-directory diagnostics for Bethesda games
//! (Fallout 4 / Skyrim): parses crash logs produced by native crash
//! reporters, runs a YAML-driven suspect/plugin/FormID detection cascade,
//! and renders per-log and aggregate Markdown reports.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod formid_correlator;
pub mod formid_index;
pub mod knowledge_base;
pub mod log_source;
pub mod mod_detector;
pub mod model;
pub mod report_writer;
pub mod rule_engine;
pub mod scanners;
pub mod scheduler;
pub mod segment_parser;
pub mod toml_lite;

pub use cancellation::CancellationToken;
pub use config::{ConfigStore, DocumentKind};
pub use error::ScanError;
pub use formid_index::FormIdIndex;
pub use knowledge_base::KnowledgeBase;
pub use log_source::LogFileSource;
pub use model::{Finding, ParsedCrashLog, ScanOutcome, ScanStatistics, Severity};
pub use scheduler::{run_batch, BatchOptions, ProgressSink};

/// Outcome of a full CLI-level run, used by `main.rs` to pick an exit code
/// (spec §6: zero findings of severity >= Warning -> 0; warnings present,
/// no critical -> 0 with report; configuration failure -> non-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Clean,
    WarningsPresent,
    ConfigurationFailed,
}

impl ExitOutcome {
    pub fn code(self) -> i32 {
        match self {
            ExitOutcome::Clean | ExitOutcome::WarningsPresent => 0,
            ExitOutcome::ConfigurationFailed => 1,
        }
    }
}

/// Summarize a batch's outcomes into the CLI exit-code decision.
pub fn summarize_outcomes(outcomes: &[ScanOutcome]) -> ExitOutcome {
    let max = outcomes
        .iter()
        .filter_map(|o| match o {
            ScanOutcome::Processed { findings, .. } | ScanOutcome::Failed { findings, .. } => {
                findings.iter().map(|f| f.severity).max()
            }
        })
        .max();

    match max {
        Some(s) if s >= Severity::Warning => ExitOutcome::WarningsPresent,
        _ => ExitOutcome::Clean,
    }
}
