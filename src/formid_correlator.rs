//! Matches FormIDs referenced in call-stack frames to loaded plugins and
//! resolves them through the FormID Index (spec §4.8).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::formid_index::FormIdIndex;
use crate::model::{Finding, ParsedCrashLog, Severity};

static FORMID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[([0-9A-F]{8})\]").expect("static FormID regex is valid")
});

const UNKNOWN_PLUGIN: &str = "[Unknown]";

/// One distinct FormID seen in the call stack: its occurrence count, the
/// plugin it was attributed to (or `"[Unknown]"`), and its resolved
/// descriptor, if the index was consulted and had an entry.
struct CorrelatedFormId {
    count: u32,
    plugin: String,
    resolved: Option<String>,
}

/// Extract every 8-hex-digit FormID in the call stack whose leading byte is
/// not `FF`, tally occurrences, attribute each to a loaded plugin by
/// load-order-index prefix, and optionally resolve through `index`.
///
/// `resolve` mirrors the "Show FormID Values" setting (spec §4.8): when
/// `false`, FormIDs are still extracted and attributed, but never queried
/// against the index. `game_edition` selects which of the index's
/// per-edition tables (spec §4.3) to query.
pub fn correlate(
    log: &ParsedCrashLog,
    index: Option<&FormIdIndex>,
    resolve: bool,
    game_edition: &str,
) -> Option<Finding> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();

    for line in &log.segments.call_stack {
        for capture in FORMID_PATTERN.captures_iter(line) {
            let formid = capture[1].to_ascii_uppercase();
            if formid.starts_with("FF") {
                continue;
            }
            *counts.entry(formid).or_insert(0) += 1;
        }
    }

    if counts.is_empty() {
        return None;
    }

    let mut correlated: BTreeMap<String, CorrelatedFormId> = BTreeMap::new();
    for (formid, count) in counts {
        let prefix = &formid[0..2];
        let plugin = log.loaded_plugins.plugin_for_index(prefix).map(str::to_string);

        let resolved = match (&plugin, index, resolve) {
            (Some(plugin), Some(index), true) => index.get(&formid, plugin, game_edition),
            _ => None,
        };

        correlated.insert(
            formid,
            CorrelatedFormId { count, plugin: plugin.unwrap_or_else(|| UNKNOWN_PLUGIN.to_string()), resolved },
        );
    }

    let message = correlated
        .iter()
        .map(|(formid, hit)| match &hit.resolved {
            Some(entry) => format!("FormID [{formid}] matched to {}: {entry}", hit.plugin),
            None => format!("FormID [{formid}] matched to {}: {}", hit.plugin, hit.count),
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(Finding::new(
        &log.source_path,
        "formid-correlation",
        "FormIDs Found In Call Stack",
        message,
        Severity::Info,
        "formid_correlator",
    ))
}
