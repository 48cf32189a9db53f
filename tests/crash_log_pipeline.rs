//! End-to-end pipeline tests driving the library's public API the way
//! `main.rs` does: parse a literal crash log, run every detector pass
//! against a hand-built catalog, and check the rendered report.

use std::path::Path;

use classic_scan::config::{ConfigStore, DocumentKind};
use classic_scan::formid_correlator;
use classic_scan::formid_index::FormIdIndex;
use classic_scan::knowledge_base::KnowledgeBase;
use classic_scan::mod_detector;
use classic_scan::report_writer;
use classic_scan::rule_engine;
use classic_scan::segment_parser;
use classic_scan::model::FindingLog;
use pretty_assertions::assert_eq;

const FIXTURE_LOG: &str = "\
Fallout 4 v1.10.163\n\
Buffout 4 v1.28.6\n\
Unhandled exception at 0x12345: EXCEPTION_ACCESS_VIOLATION\n\
[Compatibility]\n\
compat line 1\n\
SYSTEM SPECS:\n\
GPU: NVIDIA GeForce RTX 3080\n\
PROBABLE CALL STACK:\n\
[0] 0x12345 SomeFrame\n\
[1] 0x23456 BarFrame\n\
[2] 0x34567 BarFrame\n\
[3] 0x45678 [RSP+0030] FormID: [000ABCDE] is a reference\n\
MODULES:\n\
module.dll\n\
F4SE PLUGINS:\n\
f4se_plugin.dll\n\
PLUGINS:\n\
[00] Fallout4.esm\n\
[01] PluginA.esp\n\
[02] PluginB.esp\n\
[FE 001] SomeLightPlugin.esl\n\
";

fn write_all_documents(dir: &Path, main_yaml: &str, game_yaml: &str) -> ConfigStore {
    std::fs::write(dir.join("Main.yaml"), main_yaml).unwrap();
    std::fs::write(dir.join("Game.yaml"), game_yaml).unwrap();
    for kind in [DocumentKind::Settings, DocumentKind::GameLocal, DocumentKind::Ignore, DocumentKind::Test] {
        std::fs::write(dir.join(format!("{kind:?}.yaml")), "{}\n").unwrap();
    }
    let dir = dir.to_path_buf();
    ConfigStore::new(move |kind| dir.join(format!("{kind:?}.yaml")))
}

#[test]
fn full_pipeline_runs_every_detector_pass_and_renders_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let main_yaml = "\
Suspects_Main_Error:\n  \"5 | Null Memory Access\": EXCEPTION_ACCESS_VIOLATION\n\
Suspects_Call_Stack:\n  \"4 | FooCrash\":\n    - \"NOT|ExcludedSymbol\"\n    - \"2|BarFrame\"\n\
Mods_Conflict:\n  - PluginA: PluginA.esp\n    PluginB: PluginB.esp\n    Title: Known Conflict\n    Message: These two mods conflict.\n    Severity: 4\n\
Records_Of_Interest:\n  - \"FormID:\"\n\
";
    let game_yaml = "\
Mods_Important_Core:\n  HighFPSPhysicsFix.dll:\n    Title: High FPS Physics Fix\n    Message: Install it.\n    Severity: 2\n    GpuRival: amd\n\
";
    let store = write_all_documents(dir.path(), main_yaml, game_yaml);
    let kb = KnowledgeBase::new(&store);

    let lines: Vec<String> = FIXTURE_LOG.lines().map(str::to_string).collect();
    let log_path = dir.path().join("crash-2024-01-01.log");
    let parsed = segment_parser::parse(&log_path, &lines, "F4SE");

    assert_eq!(parsed.game_version, "Fallout 4 v1.10.163");
    assert!(!parsed.is_incomplete(lines.len()));

    let index = FormIdIndex::open_in_memory().unwrap();
    std::fs::write(
        dir.path().join("formids.csv"),
        "FormID,Plugin,EditorID,Name\n000ABCDE,Fallout4.esm,,FooBar\n",
    )
    .unwrap();
    index.ingest_csv(dir.path().join("formids.csv"), "Fallout4").unwrap();

    let mut findings = FindingLog::new();
    findings.extend(rule_engine::run_main_error_pass(&parsed, &kb));
    findings.extend(rule_engine::run_call_stack_pass(&parsed, &kb));
    findings.extend(rule_engine::run_named_record_pass(&parsed, &kb));
    findings.extend(mod_detector::single_plugin_findings(&parsed, &kb));
    findings.extend(mod_detector::conflict_findings(&parsed, &kb));
    findings.extend(mod_detector::important_mod_findings(&parsed, &kb));
    findings.extend(mod_detector::plugin_limit_findings(&parsed));
    findings.extend(formid_correlator::correlate(&parsed, Some(&index), true, "Fallout4"));

    let findings = findings.into_vec();

    // Main-error needle hit (scenario 1).
    assert!(findings.iter().any(|f| f.title.starts_with("Null Memory Access")));
    // Call-stack count-threshold hit: BarFrame appears twice, no ExcludedSymbol present.
    assert!(findings.iter().any(|f| f.title.starts_with("FooCrash")));
    // Pair conflict (scenario 4): both PluginA.esp and PluginB.esp are loaded.
    assert!(findings.iter().any(|f| f.title == "Known Conflict"));
    // Important mod present with an nvidia GPU and an amd-rival note: still missing, still flagged.
    assert!(findings.iter().any(|f| f.title.contains("High FPS Physics Fix")));
    // FormID resolution (scenario 6): exact message format, no trailing count.
    let formid_finding = findings.iter().find(|f| f.source_component == "formid_correlator").unwrap();
    assert!(formid_finding
        .message
        .contains("FormID [000ABCDE] matched to Fallout4.esm: FormID: 000ABCDE - Name: FooBar"));

    let rendered = report_writer::render_log_report(&log_path, &findings, false, chrono::Utc::now(), false);
    assert!(rendered.contains("## Main Error Suspects"));
    assert!(rendered.contains("## Call Stack Suspects"));
    assert!(rendered.contains("## Plugin Conflicts"));
    assert!(rendered.contains("## FormIDs In Call Stack"));
}

#[test]
fn not_signal_suppresses_the_call_stack_rule_even_with_a_satisfied_count() {
    let dir = tempfile::tempdir().unwrap();
    let main_yaml = "\
Suspects_Call_Stack:\n  \"4 | FooCrash\":\n    - \"NOT|ExcludedSymbol\"\n    - \"2|BarFrame\"\n\
";
    let store = write_all_documents(dir.path(), main_yaml, "{}\n");
    let kb = KnowledgeBase::new(&store);

    let lines: Vec<String> = "\
PROBABLE CALL STACK:\n\
BarFrame\n\
BarFrame\n\
ExcludedSymbol\n\
PLUGINS:\n\
[00] Fallout4.esm\n\
"
    .lines()
    .map(str::to_string)
    .collect();
    let parsed = segment_parser::parse(Path::new("crash-not.log"), &lines, "F4SE");

    let findings = rule_engine::run_call_stack_pass(&parsed, &kb);
    assert!(findings.is_empty(), "NOT signal must short-circuit even though BarFrame appears twice");
}

#[test]
fn config_store_mtime_round_trip_picks_up_edits_through_the_public_api() {
    let dir = tempfile::tempdir().unwrap();
    let store = write_all_documents(dir.path(), "{}\n", "{}\n");

    std::fs::write(dir.path().join("Settings.yaml"), "Some_Key: 1\n").unwrap();
    let first: Option<i64> = store.get(DocumentKind::Settings, "Some_Key");
    assert_eq!(first, Some(1));

    // force the mtime to visibly advance on coarse-grained filesystems
    std::thread::sleep(std::time::Duration::from_millis(1100));
    std::fs::write(dir.path().join("Settings.yaml"), "Some_Key: 2\n").unwrap();

    let second: Option<i64> = store.get(DocumentKind::Settings, "Some_Key");
    assert_eq!(second, Some(2), "a changed mtime must invalidate the cached document");
}
