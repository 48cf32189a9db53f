//! BA2 archive inspection, delegating extraction to an external `BSArch.exe`
//! (spec §4.11, §6). The inspection logic (magic sniffing, dumped-entry
//! parsing, classification) is in scope; spawning the extractor is an
//! out-of-scope collaborator reached only through this module's narrow
//! interface.
//!
//! The process-invocation shape is grounded in the teacher's
//! `tools/archive.rs` (`Command::new(...).output()`, non-zero exit treated
//! as failure); the bounded wait is grounded in `tools/fo4edit.rs`'s
//! poll-with-deadline idiom, generalized from "wait for a file to appear"
//! to "wait for a child process to exit within a budget".

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use log::warn;

use super::mods_scan::classify_relative_path;
use super::ScanReport;

const SKIP_ARCHIVE: &str = "prp - main.ba2";
const EXTRACTOR_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
enum Ba2Kind {
    Textures, // DX10
    General,  // GNRL
    Unrecognized,
}

fn sniff(header: &[u8]) -> Ba2Kind {
    if header.len() < 12 || &header[0..4] != b"BTDX" {
        return Ba2Kind::Unrecognized;
    }
    match &header[8..12] {
        b"DX10" => Ba2Kind::Textures,
        b"GNRL" => Ba2Kind::General,
        _ => Ba2Kind::Unrecognized,
    }
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; 12];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Run `extractor_exe` in the given mode against `archive_path`, waiting up
/// to 30 seconds for it to exit. Returns the collected stdout, or `None` if
/// the timeout elapsed (in which case the caller should emit a single
/// flagged finding rather than treat it as a process failure).
fn run_extractor(extractor_exe: &Path, mode: &str, archive_path: &Path) -> anyhow::Result<Option<String>> {
    let mut child: Child = Command::new(extractor_exe)
        .arg(mode)
        .arg(archive_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = String::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_string(&mut stdout)?;
            }
            if !status.success() {
                anyhow::bail!("{extractor_exe:?} {mode} exited with {status}");
            }
            return Ok(Some(stdout));
        }

        if start.elapsed() >= EXTRACTOR_TIMEOUT {
            warn!("extractor {extractor_exe:?} {mode} timed out after {EXTRACTOR_TIMEOUT:?}, skipping archive");
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

struct DumpedEntry {
    path: String,
    extension: String,
    width: u32,
    height: u32,
}

/// Parse `dump` output: repeating three-line blocks of path / `Ext: <ext>` /
/// `Width: <w> Height: <h>`.
fn parse_dump(output: &str) -> Vec<DumpedEntry> {
    let lines: Vec<&str> = output.lines().collect();
    let mut entries = Vec::new();
    let mut i = 0;
    while i + 2 < lines.len() {
        let path = lines[i].trim().to_string();
        let ext_line = lines[i + 1].trim();
        let dims_line = lines[i + 2].trim();
        i += 3;

        let Some(extension) = ext_line.strip_prefix("Ext:").map(|s| s.trim().to_ascii_lowercase()) else { continue };

        let width = dims_line
            .split_whitespace()
            .find_map(|tok| tok.strip_prefix("Width:"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let height = dims_line
            .split_whitespace()
            .find_map(|tok| tok.strip_prefix("Height:"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        entries.push(DumpedEntry { path, extension, width, height });
    }
    entries
}

/// Inspect one `.ba2` archive, delegating to `extractor_exe` for its
/// contents when the magic bytes are recognized. `xse_hashed_scripts` feeds
/// the same per-listed-entry classifiers the loose mod scan applies to real
/// files (spec §4.11).
pub fn scan_one(archive_path: &Path, extractor_exe: &Path, xse_hashed_scripts: &HashSet<String>, report: &mut ScanReport) {
    let Some(file_name) = archive_path.file_name().and_then(|n| n.to_str()) else { return };
    if file_name.eq_ignore_ascii_case(SKIP_ARCHIVE) {
        return;
    }

    let header = match read_header(archive_path) {
        Ok(h) => h,
        Err(_) => {
            report.ba2_wrong_format.insert(file_name.to_string());
            return;
        }
    };

    match sniff(&header) {
        Ba2Kind::Unrecognized => {
            report.ba2_wrong_format.insert(file_name.to_string());
        }
        Ba2Kind::Textures => match run_extractor(extractor_exe, "dump", archive_path) {
            Ok(Some(output)) => {
                for entry in parse_dump(&output) {
                    if entry.extension != "dds" {
                        report.wrong_texture_format.insert(entry.path.clone());
                    } else if entry.width % 2 != 0 || entry.height % 2 != 0 {
                        report.bad_texture_dimensions.insert(entry.path);
                    }
                }
            }
            Ok(None) => {
                report.ba2_wrong_format.insert(format!("{file_name} (extractor timed out)"));
            }
            Err(err) => {
                warn!("archive dump failed for {}: {err}", archive_path.display());
                report.ba2_wrong_format.insert(format!("{file_name} (extractor failed)"));
            }
        },
        Ba2Kind::General => match run_extractor(extractor_exe, "list", archive_path) {
            Ok(Some(output)) => {
                for line in output.lines() {
                    let entry = Path::new(line.trim());
                    classify_relative_path(entry, xse_hashed_scripts, report);
                }
            }
            Ok(None) => {
                report.ba2_wrong_format.insert(format!("{file_name} (extractor timed out)"));
            }
            Err(err) => {
                warn!("archive list failed for {}: {err}", archive_path.display());
                report.ba2_wrong_format.insert(format!("{file_name} (extractor failed)"));
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_recognizes_dx10_and_gnrl() {
        let mut dx10 = b"BTDX\0\0\0\0DX10".to_vec();
        dx10.truncate(12);
        assert_eq!(sniff(&dx10), Ba2Kind::Textures);

        let mut gnrl = b"BTDX\0\0\0\0GNRL".to_vec();
        gnrl.truncate(12);
        assert_eq!(sniff(&gnrl), Ba2Kind::General);

        assert_eq!(sniff(b"NOTB\0\0\0\0GNRL"), Ba2Kind::Unrecognized);
    }

    #[test]
    fn parse_dump_reads_blocks() {
        let output = "textures\\foo.dds\nExt: dds\nWidth: 101 Height: 64\n\
textures\\bar.png\nExt: png\nWidth: 64 Height: 64\n";
        let entries = parse_dump(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].extension, "dds");
        assert_eq!(entries[0].width, 101);
        assert_eq!(entries[1].extension, "png");
    }

    #[test]
    fn scan_one_flags_unrecognized_magic() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.ba2");
        std::fs::write(&archive, b"NOTMAGIC000000000000").unwrap();

        let mut report = ScanReport::new();
        scan_one(&archive, Path::new("/nonexistent/BSArch.exe"), &HashSet::new(), &mut report);
        assert!(!report.ba2_wrong_format.is_empty());
    }

    #[test]
    fn scan_one_skips_prp_main() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("PRP - Main.ba2");
        std::fs::write(&archive, b"BTDXxxxxGNRL").unwrap();

        let mut report = ScanReport::new();
        scan_one(&archive, Path::new("/nonexistent/BSArch.exe"), &HashSet::new(), &mut report);
        assert!(report.ba2_wrong_format.is_empty());
    }

    #[test]
    fn gnrl_listing_applies_loose_scan_classifiers() {
        // run_extractor will fail to spawn a nonexistent extractor, so this
        // exercises `classify_relative_path` directly against the same
        // listing-line shape the GNRL branch parses.
        let mut report = ScanReport::new();
        let mut scripts = HashSet::new();
        scripts.insert("f4se_loader.dll".to_string());

        for line in ["docs\\readme.txt", "textures\\preview.png", "sound\\voice.mp3"] {
            classify_relative_path(Path::new(line), &scripts, &mut report);
        }

        assert!(!report.documentation_relocated.is_empty());
        assert!(!report.wrong_texture_format.is_empty());
        assert!(!report.wrong_sound_format.is_empty());
    }
}
