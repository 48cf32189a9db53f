//! Discovers crash logs on disk, reformats them in place, and caches their
//! line arrays for the duration of a scan (spec §4.4).

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use log::debug;

/// A thread-safe, initialize-on-first-read cache from log path to its line
/// array, generalizing the teacher's `scan_directory_for_files` WalkDir walk
/// from a fixed extension to a configurable glob.
pub struct LogFileSource {
    cache: DashMap<PathBuf, Vec<String>>,
}

impl LogFileSource {
    pub fn new() -> Self {
        Self { cache: DashMap::new() }
    }

    /// Enumerate files under `dir` matching `glob_pattern` (e.g.
    /// `"crash-*.log"`), sorted by path for stable ordering.
    pub fn discover(dir: &Path, glob_pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = dir.join(glob_pattern);
        let pattern_str = pattern.to_string_lossy().into_owned();
        let mut found: Vec<PathBuf> = glob::glob(&pattern_str)?.filter_map(Result::ok).collect();
        found.sort();
        Ok(found)
    }

    /// Read `path`'s lines, applying the reformat pass (strip lines matching
    /// any `exclude_log_records` needle, trim trailing blank lines) and
    /// writing the file back only if the content actually changed. The
    /// result is retained in this source's cache for subsequent `lines`
    /// calls.
    pub fn load_and_reformat(&self, path: &Path, exclude_log_records: &[String]) -> anyhow::Result<Vec<String>> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached.clone());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ScanError::io(path, e))?;
        let original_lines: Vec<String> = raw.lines().map(str::to_string).collect();
        let reformatted = reformat(&original_lines, exclude_log_records);

        if reformatted != original_lines {
            debug!("reformatting crash log in place: {}", path.display());
            std::fs::write(path, reformatted.join("\n") + "\n").map_err(|e| crate::error::ScanError::io(path, e))?;
        }

        self.cache.insert(path.to_path_buf(), reformatted.clone());
        Ok(reformatted)
    }

    /// Retrieve a previously loaded log's lines without touching disk.
    pub fn lines(&self, path: &Path) -> Option<Vec<String>> {
        self.cache.get(path).map(|v| v.clone())
    }

    /// Drop the cached line array for `path`, freeing its backing storage.
    pub fn dispose(&self, path: &Path) {
        self.cache.remove(path);
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

impl Default for LogFileSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip lines containing any `exclude_log_records` needle (case-insensitive
/// substring) and trim trailing blank lines. Idempotent:
/// `reformat(reformat(lines)) == reformat(lines)`.
fn reformat(lines: &[String], exclude_log_records: &[String]) -> Vec<String> {
    let needles: Vec<String> = exclude_log_records.iter().map(|s| s.to_ascii_lowercase()).collect();

    let mut kept: Vec<String> = lines
        .iter()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            !needles.iter().any(|needle| lower.contains(needle.as_str()))
        })
        .cloned()
        .collect();

    while matches!(kept.last(), Some(last) if last.trim().is_empty()) {
        kept.pop();
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reformat_strips_excluded_lines_and_trailing_blanks() {
        let lines = vec![
            "keep me".to_string(),
            "this has NOISE in it".to_string(),
            "also keep".to_string(),
            String::new(),
            String::new(),
        ];
        let excluded = vec!["noise".to_string()];
        let result = reformat(&lines, &excluded);
        assert_eq!(result, vec!["keep me".to_string(), "also keep".to_string()]);
    }

    #[test]
    fn reformat_is_idempotent() {
        let lines = vec!["a".to_string(), "b NOISE".to_string(), String::new()];
        let excluded = vec!["noise".to_string()];
        let once = reformat(&lines, &excluded);
        let twice = reformat(&once, &excluded);
        assert_eq!(once, twice);
    }

    #[test]
    fn load_and_reformat_writes_back_only_when_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash-2024-01-01.log");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "keep").unwrap();
        writeln!(f, "drop ME this").unwrap();
        drop(f);

        let source = LogFileSource::new();
        let lines = source.load_and_reformat(&path, &["drop me".to_string()]).unwrap();
        assert_eq!(lines, vec!["keep".to_string()]);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "keep\n");
    }

    #[test]
    fn discover_sorts_by_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("crash-b.log"), "").unwrap();
        std::fs::write(dir.path().join("crash-a.log"), "").unwrap();
        std::fs::write(dir.path().join("other.txt"), "").unwrap();

        let found = LogFileSource::discover(dir.path(), "crash-*.log").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].to_string_lossy().ends_with("crash-a.log"));
        assert!(found[1].to_string_lossy().ends_with("crash-b.log"));
    }
}
