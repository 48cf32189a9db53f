//! Log-Error Scan: walks non-crash game/document logs looking for lines
//! that match a "catch" substring list while excluding known-benign noise
//! (spec §4.12).

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One flagged line within one scanned log file.
pub struct LogErrorHit {
    pub path: PathBuf,
    pub line_number: usize,
    pub line: String,
}

/// Best-effort text decode: try UTF-8 first (after stripping a BOM), then
/// fall back to lossy Latin-1-style byte-widening, matching spec §4.12's
/// "BOM first, then a fallback" rule without pulling in a third-party
/// encoding detector (spec §9: "no third-party encoding detector required").
fn read_best_effort(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let without_bom = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    match std::str::from_utf8(without_bom) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Ok(without_bom.iter().map(|&b| b as char).collect()),
    }
}

/// Walk `root` for `*.log` files (excluding crash logs and any path
/// containing an `exclude_log_files` substring), flagging lines that
/// contain a `catch_log_errors` substring and none of `exclude_log_errors`.
pub fn scan(
    root: &Path,
    catch_log_errors: &[String],
    exclude_log_errors: &[String],
    exclude_log_files: &[String],
) -> Vec<LogErrorHit> {
    let mut hits = Vec::new();
    if !root.exists() {
        return hits;
    }

    let exclude_files: Vec<String> = exclude_log_files.iter().map(|s| s.to_ascii_lowercase()).collect();
    let catch: Vec<String> = catch_log_errors.iter().map(|s| s.to_ascii_lowercase()).collect();
    let exclude: Vec<String> = exclude_log_errors.iter().map(|s| s.to_ascii_lowercase()).collect();

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        if !ext.eq_ignore_ascii_case("log") {
            continue;
        }

        let path_lower = path.to_string_lossy().to_ascii_lowercase();
        if path_lower.contains("crash-") || exclude_files.iter().any(|needle| path_lower.contains(needle.as_str())) {
            continue;
        }

        let Ok(content) = read_best_effort(path) else { continue };
        for (idx, line) in content.lines().enumerate() {
            let lower = line.to_ascii_lowercase();
            let matches_catch = catch.iter().any(|needle| lower.contains(needle.as_str()));
            let matches_exclude = exclude.iter().any(|needle| lower.contains(needle.as_str()));
            if matches_catch && !matches_exclude {
                hits.push(LogErrorHit { path: path.to_path_buf(), line_number: idx + 1, line: line.to_string() });
            }
        }
    }

    hits
}
