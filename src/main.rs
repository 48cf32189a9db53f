use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use classic_scan::config::DocumentKind;
use classic_scan::knowledge_base::CrashgenKind;
use classic_scan::scanners::{archive_scan, crashgen_check, log_errors, mods_scan, ScanReport};
use classic_scan::{
    report_writer, run_batch, summarize_outcomes, BatchOptions, CancellationToken, ConfigStore,
    ExitOutcome, FormIdIndex, KnowledgeBase, LogFileSource, ScanStatistics,
};

#[derive(Parser, Debug)]
#[command(name = "classic-scan")]
#[command(about = "Crash log analysis and mod-directory diagnostics for Bethesda games", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the YAML catalogs (Main/Game/Settings/GameLocal/Ignore).
    /// Defaults to the current directory.
    #[arg(long = "config", value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Override the Settings document path (`CLASSIC Settings.yaml`).
    #[arg(long = "settings", value_name = "FILE", global = true)]
    settings_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a directory of crash logs.
    Scan {
        #[arg(value_name = "LOGS_DIR")]
        logs_dir: PathBuf,

        /// Extender acronym used to locate the `<XSE> PLUGINS:` segment header.
        #[arg(long, default_value = "F4SE")]
        xse_acronym: String,

        /// Move logs with no Warning-or-higher finding into `Unsolved Logs`.
        #[arg(long)]
        move_unsolved_logs: bool,

        /// Enable FCX mode file checks in the per-log report.
        #[arg(long)]
        fcx_mode: bool,

        /// Path to a FormID lookup database (SQLite). Omit to disable resolution.
        #[arg(long, value_name = "PATH")]
        formid_db: Option<PathBuf>,

        /// Game edition the FormID lookup database should be queried under
        /// (spec §4.3: the index keeps one table per game edition).
        #[arg(long, default_value = "Fallout4")]
        game_edition: String,
    },
    /// Run the file-level scanners over a game installation directory.
    ScanGame {
        #[arg(value_name = "GAME_ROOT")]
        game_root: PathBuf,

        /// Path to `BSArch.exe` (or compatible), used to inspect BA2 archives.
        #[arg(long, value_name = "PATH")]
        extractor: Option<PathBuf>,
    },
    /// Run the file-level scanners over a mod staging directory.
    ScanMods {
        #[arg(value_name = "MODS_DIR")]
        mods_dir: PathBuf,

        /// Remove the original documentation/FOMOD files after copying them
        /// to `CLASSIC Backup/Cleaned Files` (default: copy only).
        #[arg(long)]
        delete_originals: bool,
    },
}

fn document_path(config_dir: &Path, settings_override: Option<&Path>, kind: DocumentKind) -> PathBuf {
    if kind == DocumentKind::Settings {
        if let Some(path) = settings_override {
            return path.to_path_buf();
        }
    }
    let file_name = match kind {
        DocumentKind::Main => "CLASSIC Main.yaml",
        DocumentKind::Game => "CLASSIC Fallout4.yaml",
        DocumentKind::Settings => "CLASSIC Settings.yaml",
        DocumentKind::GameLocal => "CLASSIC Fallout4 Local.yaml",
        DocumentKind::Ignore => "CLASSIC Ignore.yaml",
        DocumentKind::Test => "tests/test_settings.yaml",
    };
    config_dir.join(file_name)
}

fn build_store(config_dir: &Path, settings_override: Option<&Path>) -> ConfigStore {
    let config_dir = config_dir.to_path_buf();
    let settings_override = settings_override.map(Path::to_path_buf);
    ConfigStore::new(move |kind| document_path(&config_dir, settings_override.as_deref(), kind))
}

/// Crashgen TOML files we know how to validate, keyed by their usual
/// filename under a Fallout 4 installation's `Data/F4SE/Plugins` directory.
const CRASHGEN_CONFIGS: &[(&str, CrashgenKind)] = &[
    ("Data/F4SE/Plugins/Buffout4.toml", CrashgenKind::Buffout4),
    ("Data/F4SE/Plugins/CrashLogger.toml", CrashgenKind::CrashLogger),
    ("Data/F4SE/Plugins/EngineFixes.toml", CrashgenKind::EngineFixes),
];

fn run() -> Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();
    let config_dir = args.config_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let store = build_store(&config_dir, args.settings_path.as_deref());
    store.preload_immutable();

    let parse_failures = store.parse_failures();
    if !parse_failures.is_empty() {
        for (kind, err) in &parse_failures {
            eprintln!("error: configuration document {kind:?} is malformed: {err}");
        }
        return Ok(ExitCode::from(u8::try_from(ExitOutcome::ConfigurationFailed.code()).unwrap_or(1)));
    }

    match args.command {
        Command::Scan { logs_dir, xse_acronym, move_unsolved_logs, fcx_mode, formid_db, game_edition } => {
            info!("scanning crash logs in {}", logs_dir.display());

            let source = LogFileSource::new();
            let log_paths = source
                .discover(&logs_dir, "crash-*.log")
                .context("failed to enumerate crash logs")?;

            let formid_index = formid_db
                .as_deref()
                .map(FormIdIndex::open)
                .transpose()
                .context("failed to open FormID lookup database")?;

            let options = BatchOptions {
                xse_acronym,
                show_formid_values: true,
                move_unsolved_logs,
                fcx_mode,
                game_edition,
            };
            let cancellation = CancellationToken::new();
            let (outcomes, stats) = run_batch(
                &log_paths,
                &source,
                &store,
                formid_index.as_ref(),
                &options,
                &cancellation,
                Some(&|percent, operation, item| info!("[{percent:>3}%] {operation}: {item}")),
            );

            let report_text = report_writer::render_aggregate_report(&stats, &ScanReport::new(), &ScanReport::new());
            let report_path = report_writer::write_aggregate_report(&logs_dir, &report_text)
                .context("failed to write aggregate report")?;
            info!("aggregate report written to {}", report_path.display());

            let outcome = summarize_outcomes(&outcomes);
            Ok(ExitCode::from(u8::try_from(outcome.code()).unwrap_or(1)))
        }
        Command::ScanGame { game_root, extractor } => {
            info!("scanning game installation at {}", game_root.display());
            let kb = KnowledgeBase::new(&store);

            let mut report = ScanReport::new();
            if let Some(extractor) = &extractor {
                let xse_hashed_scripts = kb.xse_hashed_scripts();
                for entry in walkdir::WalkDir::new(&game_root).into_iter().filter_map(Result::ok) {
                    let is_ba2 = entry
                        .path()
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("ba2"));
                    if is_ba2 {
                        archive_scan::scan_one(entry.path(), extractor, &xse_hashed_scripts, &mut report);
                    }
                }
            }

            let mut crashgen_findings = Vec::new();
            for (relative, kind) in CRASHGEN_CONFIGS {
                let config_path = game_root.join(relative);
                if !config_path.exists() {
                    continue;
                }
                crashgen_findings.extend(crashgen_check::check(&config_path, *kind, &kb)?);
            }
            for finding in &crashgen_findings {
                info!("{}: {}", finding.issue_id, finding.message);
            }

            let log_hits = log_errors::scan(
                &game_root,
                &kb.catch_log_errors(),
                &kb.exclude_log_errors(),
                &kb.exclude_log_files(),
            );
            for hit in &log_hits {
                info!("{}:{}: {}", hit.path.display(), hit.line_number, hit.line);
            }

            let report_text = report_writer::render_aggregate_report(&ScanStatistics::new(), &report, &ScanReport::new());
            let report_path = report_writer::write_aggregate_report(&game_root, &report_text)
                .context("failed to write game scan report")?;
            info!("game scan report written to {}", report_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::ScanMods { mods_dir, delete_originals } => {
            info!("scanning mods directory at {}", mods_dir.display());
            let kb = KnowledgeBase::new(&store);
            let report = mods_scan::scan(&mods_dir, &kb.xse_hashed_scripts(), delete_originals);

            let report_text = report_writer::render_aggregate_report(&ScanStatistics::new(), &ScanReport::new(), &report);
            let report_path = report_writer::write_aggregate_report(&mods_dir, &report_text)
                .context("failed to write mods scan report")?;
            info!("mods scan report written to {}", report_path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
