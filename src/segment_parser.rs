//! Turns a raw crash-log line sequence into a `ParsedCrashLog` (spec §4.5).
//!
//! The six segment headers are matched as anchored prefixes in a fixed
//! order; any segment whose header never appears is left as an empty list
//! rather than missing, preserving the segment-totality invariant tested
//! in §8.

use std::path::Path;

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{LoadedPlugins, ParsedCrashLog, Segments};

/// One segment boundary: the header prefix to look for, and which `Segments`
/// field it fills. `xse_acronym` is substituted into the XSE header at parse
/// time (`F4SE` for Fallout 4, `SKSE` for Skyrim).
enum Header {
    Compatibility,
    SystemSpecs,
    CallStack,
    Modules,
    XseModules,
    Plugins,
}

const HEADERS_IN_ORDER: [(&str, Header); 6] = [
    ("[Compatibility]", Header::Compatibility),
    ("SYSTEM SPECS:", Header::SystemSpecs),
    ("PROBABLE CALL STACK:", Header::CallStack),
    ("MODULES:", Header::Modules),
    ("<XSE> PLUGINS:", Header::XseModules),
    ("PLUGINS:", Header::Plugins),
];

static PLUGIN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\[\s*([0-9A-F]{2,8}(?:\s+[0-9A-F]+)?)\s*\]\s+)?([^\[\]]+?\.(?:esl|esp|esm))(?:\s+\([^)]*\))?\s*$",
    )
    .expect("static plugin-line regex is valid")
});

static GAME_VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(Fallout 4|Skyrim)\b.*v[\d.]+").expect("static game-version regex is valid")
});

static CRASHGEN_VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9 _]+ v[\d.]+").expect("static crashgen-version regex is valid")
});

/// Parse one crash log's lines into a `ParsedCrashLog`.
///
/// `xse_acronym` selects which per-game XSE header to recognize (`"F4SE"` or
/// `"SKSE"`); callers resolve this from the active game edition before
/// calling in.
pub fn parse(source_path: &Path, lines: &[String], xse_acronym: &str) -> ParsedCrashLog {
    let xse_header = format!("{xse_acronym} PLUGINS:");

    let mut game_version = String::new();
    let mut crashgen_name_and_version = String::new();
    let mut main_error = String::new();

    let mut segments = Segments::default();
    let mut current: Option<Header> = None;
    let mut current_lines: Vec<String> = Vec::new();

    let flush = |current: &Option<Header>, current_lines: Vec<String>, segments: &mut Segments| {
        match current {
            Some(Header::Compatibility) => segments.crashgen_settings = current_lines,
            Some(Header::SystemSpecs) => segments.system_specs = current_lines,
            Some(Header::CallStack) => segments.call_stack = current_lines,
            Some(Header::Modules) => segments.all_modules = current_lines,
            Some(Header::XseModules) => segments.xse_modules = current_lines,
            Some(Header::Plugins) => segments.plugins = current_lines,
            None => {}
        }
    };

    for line in lines {
        if game_version.is_empty() && GAME_VERSION_LINE.is_match(line) {
            game_version = line.trim().to_string();
        }
        if crashgen_name_and_version.is_empty() && CRASHGEN_VERSION_LINE.is_match(line) {
            crashgen_name_and_version = line.trim().to_string();
        }
        if main_error.is_empty() && line.contains("EXCEPTION_") {
            main_error = line.replace('|', "\n");
        }

        let matched_header = HEADERS_IN_ORDER.iter().find(|(prefix, h)| {
            let prefix = if matches!(h, Header::XseModules) { xse_header.as_str() } else { prefix };
            line.starts_with(prefix)
        });

        if let Some((_, header)) = matched_header {
            flush(&current, std::mem::take(&mut current_lines), &mut segments);
            current = Some(match header {
                Header::Compatibility => Header::Compatibility,
                Header::SystemSpecs => Header::SystemSpecs,
                Header::CallStack => Header::CallStack,
                Header::Modules => Header::Modules,
                Header::XseModules => Header::XseModules,
                Header::Plugins => Header::Plugins,
            });
            continue;
        }

        if current.is_some() {
            current_lines.push(line.clone());
        }
    }
    flush(&current, current_lines, &mut segments);

    if main_error.is_empty() {
        main_error = "UNKNOWN".to_string();
    }

    let loaded_plugins = parse_plugins(&segments.plugins);

    ParsedCrashLog {
        source_path: source_path.to_path_buf(),
        game_version,
        crashgen_name_and_version,
        main_error,
        segments,
        loaded_plugins,
    }
}

fn parse_plugins(plugin_lines: &[String]) -> LoadedPlugins {
    let mut plugins = LoadedPlugins::new();
    for line in plugin_lines {
        let Some(captures) = PLUGIN_LINE.captures(line) else { continue };
        let name = captures.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let index = captures
            .get(1)
            .map(|m| m.as_str().split_whitespace().next().unwrap_or("FF").to_string())
            .unwrap_or_else(|| "FF".to_string());
        plugins.insert(name, index);
    }
    plugins
}
