//! Plugin-level diagnostics: single-plugin warnings, pair conflicts,
//! important-mod presence checks, and plugin-count limits (spec §4.7).
//!
//! The full/light plugin counting follows `libloadorder`'s documented
//! load-order semantics (the `FE` light-plugin sentinel, `.esl` extension).

use crate::knowledge_base::KnowledgeBase;
use crate::model::{Finding, ParsedCrashLog, Severity};

const LONDON_WORLDSPACE: &str = "londonworldspace.esm";

/// Single-plugin matches: exact-key hits at full severity, substring hits
/// (either direction, non-identical) tagged `"Potential "` at lower severity.
pub fn single_plugin_findings(log: &ParsedCrashLog, kb: &KnowledgeBase<'_>) -> Vec<Finding> {
    let notes = kb.mods_single();
    let mut findings = Vec::new();

    for (plugin_name, _index) in log.loaded_plugins.iter() {
        for (fingerprint, note) in &notes {
            let exact = plugin_name.eq_ignore_ascii_case(fingerprint);
            let substring = !exact
                && (plugin_name.to_ascii_lowercase().contains(&fingerprint.to_ascii_lowercase())
                    || fingerprint.to_ascii_lowercase().contains(&plugin_name.to_ascii_lowercase()));

            if !exact && !substring {
                continue;
            }

            let title = if exact {
                note.title.clone()
            } else {
                format!("Potential {}", note.title)
            };

            let mut finding = Finding::new(
                &log.source_path,
                format!("mod-single:{fingerprint}:{plugin_name}"),
                title,
                note.message.clone(),
                Severity::from_catalog_number(note.severity),
                "mod_detector::single",
            )
            .with_catalog_severity(note.severity);
            if let Some(rec) = &note.recommendation {
                finding = finding.with_recommendation(rec.clone());
            }
            findings.push(finding);
        }
    }

    findings
}

/// Pair-conflict checks: one finding per conflict rule where both plugins
/// are present (exact or substring, case-insensitive).
pub fn conflict_findings(log: &ParsedCrashLog, kb: &KnowledgeBase<'_>) -> Vec<Finding> {
    kb.mods_conflict()
        .into_iter()
        .filter_map(|rule| {
            let a_present =
                log.loaded_plugins.contains_exact(&rule.plugin_a) || log.loaded_plugins.contains_substring(&rule.plugin_a);
            let b_present =
                log.loaded_plugins.contains_exact(&rule.plugin_b) || log.loaded_plugins.contains_substring(&rule.plugin_b);

            if !(a_present && b_present) {
                return None;
            }

            let mut finding = Finding::new(
                &log.source_path,
                format!("mod-conflict:{}:{}", rule.plugin_a, rule.plugin_b),
                rule.title.clone(),
                rule.message.clone(),
                Severity::from_catalog_number(rule.severity),
                "mod_detector::conflict",
            )
            .with_catalog_severity(rule.severity);
            if let Some(rec) = rule.recommendation {
                finding = finding.with_recommendation(rec);
            }
            Some(finding)
        })
        .collect()
}

/// Select the GPU vendor family (`nvidia`/`amd`) from the parsed system
/// specs segment, if present.
fn detect_gpu_family(log: &ParsedCrashLog) -> Option<&'static str> {
    let specs = log.segments.system_specs.join("\n").to_ascii_lowercase();
    if specs.contains("nvidia") {
        Some("nvidia")
    } else if specs.contains("amd") || specs.contains("radeon") {
        Some("amd")
    } else {
        None
    }
}

/// Important-plugin presence: emit a "missing important mod" finding
/// (Warning) for every catalog entry with no matching loaded plugin, unless
/// its `gpu_rival` field matches the detected GPU family.
pub fn important_mod_findings(log: &ParsedCrashLog, kb: &KnowledgeBase<'_>) -> Vec<Finding> {
    let is_folon = log.loaded_plugins.contains_exact(LONDON_WORLDSPACE);
    let notes = if is_folon { kb.mods_important_folon() } else { kb.mods_important_core() };
    let gpu_family = detect_gpu_family(log);

    notes
        .into_iter()
        .filter_map(|(plugin_name, note)| {
            let present =
                log.loaded_plugins.contains_exact(&plugin_name) || log.loaded_plugins.contains_substring(&plugin_name);
            if present {
                return None;
            }

            if let (Some(rival), Some(detected)) = (&note.gpu_rival, gpu_family) {
                if rival.eq_ignore_ascii_case(detected) {
                    return None;
                }
            }

            let mut finding = Finding::new(
                &log.source_path,
                format!("mod-important-missing:{plugin_name}"),
                format!("{} Is Not Installed", note.title),
                note.message.clone(),
                Severity::Warning,
                "mod_detector::important",
            );
            if let Some(rec) = note.recommendation {
                finding = finding.with_recommendation(rec);
            }
            Some(finding)
        })
        .collect()
}

/// Fallout 4 edition plugin-count limits (spec §4.7): 254 full-plugin
/// ceiling, 4096 light-plugin ceiling, 500 total-plugin soft warning.
pub fn plugin_limit_findings(log: &ParsedCrashLog) -> Vec<Finding> {
    let full_count = log.loaded_plugins.full_count();
    let light_count = log.loaded_plugins.light_count();
    let total = log.loaded_plugins.len();

    let mut findings = Vec::new();

    if full_count > 254 {
        findings.push(Finding::new(
            &log.source_path,
            "plugin-limit:full-critical",
            "Too Many Full Plugins",
            format!("{full_count} full plugins are loaded; the game supports at most 254."),
            Severity::Critical,
            "mod_detector::limits",
        ));
    } else if full_count > 254 - 20 {
        findings.push(Finding::new(
            &log.source_path,
            "plugin-limit:full-warning",
            "Approaching The Full Plugin Limit",
            format!("{full_count} full plugins are loaded, close to the 254 limit."),
            Severity::Warning,
            "mod_detector::limits",
        ));
    }

    if light_count > 4096 {
        findings.push(Finding::new(
            &log.source_path,
            "plugin-limit:light-critical",
            "Too Many Light Plugins",
            format!("{light_count} light plugins are loaded; the game supports at most 4096."),
            Severity::Critical,
            "mod_detector::limits",
        ));
    }

    if total > 500 {
        findings.push(Finding::new(
            &log.source_path,
            "plugin-limit:total-warning",
            "High Total Plugin Count",
            format!("{total} total plugins are loaded."),
            Severity::Warning,
            "mod_detector::limits",
        ));
    }

    findings
}
