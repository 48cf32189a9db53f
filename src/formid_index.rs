//! Persistent `(formid, plugin) -> entry` lookup table (spec §4.3).
//!
//! Backed by a bundled SQLite file: the spec's own schema (§3) names an
//! explicit `PRIMARY KEY(formid, plugin)` plus secondary indexes on each
//! column, which calls for a real SQL engine rather than a hand-rolled
//! format. `rusqlite`'s `bundled` feature keeps this dependency-free at
//! the system level, the same way the rest of this crate avoids requiring
//! anything beyond what cargo fetches.
//!
//! Spec §4.3 requires "a schema containing **one table per game edition**"
//! rather than one global table: `Fallout4` and `SkyrimSE` FormIDs share no
//! numbering space, so every table-touching operation (`ingest_csv`, `get`)
//! takes a `game_edition` and is scoped to that edition's table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use dashmap::DashMap;
use rusqlite::Connection;

/// Turn a free-form game-edition name (`"Fallout4"`, `"Skyrim SE"`, ...)
/// into a safe SQL table name, scoped under a shared prefix.
fn table_name(game_edition: &str) -> String {
    let suffix: String = game_edition
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let suffix = if suffix.is_empty() { "default".to_string() } else { suffix };
    format!("formid_entries_{suffix}")
}

/// Normalize a FormID hex string to upper-case, trimming any `0x` prefix
/// or surrounding brackets a caller might pass through unchanged.
pub fn normalize_formid(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_matches(|c| c == '[' || c == ']')
        .to_ascii_uppercase()
}

pub fn normalize_plugin(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// A single CSV row, after validating required columns are present.
struct CsvRow {
    formid: String,
    plugin: String,
    editor_id: Option<String>,
    name: Option<String>,
}

fn compose_entry(formid: &str, editor_id: Option<&str>, name: Option<&str>) -> String {
    let mut entry = format!("FormID: {formid} - ");
    if let Some(edid) = editor_id.filter(|s| !s.is_empty()) {
        entry.push_str(&format!("[EDID: {edid} - "));
        if let Some(n) = name.filter(|s| !s.is_empty()) {
            entry.push_str(&format!("Name: {n}"));
        }
        entry.push(']');
        // if there was no name, close the trailing " - " cleanly
        if name.filter(|s| !s.is_empty()).is_none() {
            entry = entry.replace(" - ]", "]");
        }
    } else if let Some(n) = name.filter(|s| !s.is_empty()) {
        entry.push_str(&format!("Name: {n}"));
    }
    entry.trim_end_matches(" - ").to_string()
}

/// Read-mostly handle to the FormID Index. Construction opens (or creates)
/// the SQLite file; queries are cached per-process and concurrent readers
/// are safe. Ingest requires `&mut self` / exclusive access, matching the
/// "single-writer during ingest, multi-reader during scan" contract.
///
/// The cache key includes the game edition so two editions never collide
/// even if they happen to share a FormID/plugin pair.
pub struct FormIdIndex {
    conn: Mutex<Connection>,
    cache: DashMap<(String, String, String), Option<String>>,
}

impl FormIdIndex {
    /// Open an existing index file read-write. Does not create any
    /// per-edition tables up front — `ingest_csv` creates the table for
    /// whichever edition it is given the first time it is used.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn), cache: DashMap::new() })
    }

    /// Open an in-memory index, used by tests and by callers that only
    /// need the index for the duration of one process.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn), cache: DashMap::new() })
    }

    /// (Re-)create the schema from scratch at `path`, removing any existing
    /// file first, with one table pre-created per entry in `game_editions`
    /// (spec §4.3: "a schema containing one table per game edition").
    /// Idempotent in the sense that calling it twice leaves the same empty
    /// schema in place.
    pub fn create(path: impl AsRef<Path>, game_editions: &[&str]) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let index = Self::open(path)?;
        {
            let conn = index.conn.lock().unwrap();
            for edition in game_editions {
                Self::ensure_schema(&conn, edition)?;
            }
        }
        Ok(index)
    }

    fn ensure_schema(conn: &Connection, game_edition: &str) -> anyhow::Result<()> {
        let table = table_name(game_edition);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                formid TEXT NOT NULL,
                plugin TEXT NOT NULL,
                entry  TEXT NOT NULL,
                PRIMARY KEY (formid, plugin)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_formid ON {table}(formid);
            CREATE INDEX IF NOT EXISTS idx_{table}_plugin ON {table}(plugin);
            CREATE INDEX IF NOT EXISTS idx_{table}_entry ON {table}(entry);"
        ))?;
        Ok(())
    }

    /// Stream one CSV file into `game_edition`'s table within a single
    /// transaction, creating that table first if it doesn't exist yet.
    /// Returns the number of rows inserted; rows missing `FormID` or
    /// `Plugin` are skipped.
    pub fn ingest_csv(&self, path: impl AsRef<Path>, game_edition: &str) -> anyhow::Result<usize> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path.as_ref())?;
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let formid_col = col("FormID");
        let plugin_col = col("Plugin");
        let edid_col = col("EditorID");
        let name_col = col("Name");

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let (Some(fc), Some(pc)) = (formid_col, plugin_col) else { continue };
            let Some(formid) = record.get(fc).filter(|s| !s.is_empty()) else { continue };
            let Some(plugin) = record.get(pc).filter(|s| !s.is_empty()) else { continue };
            rows.push(CsvRow {
                formid: normalize_formid(formid),
                plugin: normalize_plugin(plugin),
                editor_id: edid_col.and_then(|c| record.get(c)).map(str::to_string),
                name: name_col.and_then(|c| record.get(c)).map(str::to_string),
            });
        }

        let table = table_name(game_edition);
        let mut conn = self.conn.lock().unwrap();
        Self::ensure_schema(&conn, game_edition)?;
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table} (formid, plugin, entry) VALUES (?1, ?2, ?3)"
            ))?;
            for row in &rows {
                let entry = compose_entry(&row.formid, row.editor_id.as_deref(), row.name.as_deref());
                stmt.execute(rusqlite::params![row.formid, row.plugin, entry])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Query `(formid, plugin)` within `game_edition`'s table, caching both
    /// hits and misses for the lifetime of this handle. A `game_edition`
    /// with no ingested data yet (no table) is treated as a clean miss.
    pub fn get(&self, formid: &str, plugin: &str, game_edition: &str) -> Option<String> {
        let key = (game_edition.to_string(), normalize_formid(formid), normalize_plugin(plugin));
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let table = table_name(game_edition);
        let conn = self.conn.lock().unwrap();
        let result: Option<String> = conn
            .query_row(
                &format!("SELECT entry FROM {table} WHERE formid = ?1 AND plugin = ?2"),
                rusqlite::params![key.1, key.2],
                |row| row.get(0),
            )
            .ok();

        self.cache.insert(key, result.clone());
        result
    }

    /// Number of cached query results (hits and misses), exposed for tests.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

/// Convenience wrapper for ingesting several CSV files in a single pass,
/// each scoped to its own game edition's table.
pub fn ingest_many(
    index: &FormIdIndex,
    files: &[(&str, impl AsRef<Path>)],
) -> anyhow::Result<HashMap<String, usize>> {
    let mut counts = HashMap::new();
    for (game_edition, path) in files {
        let path = path.as_ref();
        let count = index.ingest_csv(path, game_edition)?;
        counts.insert(path.to_string_lossy().into_owned(), count);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn compose_entry_matches_spec_format() {
        assert_eq!(
            compose_entry("000ABCDE", None, Some("FooBar")),
            "FormID: 000ABCDE - Name: FooBar"
        );
        assert_eq!(
            compose_entry("000ABCDE", Some("MyEdid"), Some("FooBar")),
            "FormID: 000ABCDE - [EDID: MyEdid - Name: FooBar]"
        );
        assert_eq!(compose_entry("000ABCDE", None, None), "FormID: 000ABCDE");
    }

    #[test]
    fn csv_ingest_then_query_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("formids.csv");
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(f, "FormID,Plugin,EditorID,Name").unwrap();
        writeln!(f, "000ABCDE,Fallout4.esm,,FooBar").unwrap();
        writeln!(f, ",MissingFormId.esp,,Ignored").unwrap(); // skipped: no FormID

        let index = FormIdIndex::open_in_memory().unwrap();
        let inserted = index.ingest_csv(&csv_path, "Fallout4").unwrap();
        assert_eq!(inserted, 1);

        let entry = index.get("000ABCDE", "fallout4.esm", "Fallout4").unwrap();
        assert_eq!(entry, "FormID: 000ABCDE - Name: FooBar");
    }

    #[test]
    fn editions_do_not_share_a_table() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("formids.csv");
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(f, "FormID,Plugin,EditorID,Name").unwrap();
        writeln!(f, "000ABCDE,Fallout4.esm,,FooBar").unwrap();

        let index = FormIdIndex::open_in_memory().unwrap();
        index.ingest_csv(&csv_path, "Fallout4").unwrap();

        assert!(index.get("000ABCDE", "fallout4.esm", "Fallout4").is_some());
        assert!(index.get("000ABCDE", "fallout4.esm", "SkyrimSE").is_none());
    }

    #[test]
    fn misses_are_cached() {
        let index = FormIdIndex::open_in_memory().unwrap();
        assert!(index.get("DEADBEEF", "nope.esp", "Fallout4").is_none());
        assert_eq!(index.cache_len(), 1);
        assert!(index.get("DEADBEEF", "nope.esp", "Fallout4").is_none());
        assert_eq!(index.cache_len(), 1);
    }

    #[test]
    fn normalize_formats() {
        assert_eq!(normalize_formid("0x000abcde"), "000ABCDE");
        assert_eq!(normalize_plugin("Fallout4.ESM"), "fallout4.esm");
    }
}
