//! Loose-file mod-staging classifier (spec §4.11).
//!
//! Grounded in the teacher's `filesystem.rs` WalkDir classification loop,
//! generalized from FO4-install-specific checks to the mod-scan's
//! documentation/FOMOD/texture/sound/script classifiers.

use std::collections::HashSet;
use std::path::Path;

use log::warn;
use walkdir::WalkDir;

use super::ScanReport;

const DOC_NAME_FRAGMENTS: [&str; 4] = ["readme", "changes", "changelog", "change log"];
const DOC_EXTENSIONS: [&str; 4] = ["txt", "rtf", "pdf", "doc"];
const DDS_HEADER_LEN: usize = 20;
const BACKUP_DIR: &str = "CLASSIC Backup/Cleaned Files";

/// Walk `mods_dir`, classifying every file per spec §4.11. `xse_hashed_scripts`
/// names known script-extender DLLs that sometimes end up loose under
/// `Scripts/`. Documentation files and `fomod` directories are relocated
/// (copied to `CLASSIC Backup/Cleaned Files/<mirrored-relative-path>` under
/// `mods_dir`); `delete_originals` controls whether the source is then
/// removed (the "copy-then-optional-delete" contract of spec §4.11/§6).
pub fn scan(mods_dir: &Path, xse_hashed_scripts: &HashSet<String>, delete_originals: bool) -> ScanReport {
    let mut report = ScanReport::new();
    if !mods_dir.exists() {
        return report;
    }

    let backup_root = mods_dir.join(BACKUP_DIR);
    for entry in WalkDir::new(mods_dir)
        .into_iter()
        .filter_entry(|e| e.path() != backup_root && !e.path().starts_with(&backup_root))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path == mods_dir {
            continue;
        }
        let relative = path.strip_prefix(mods_dir).unwrap_or(path);

        if entry.file_type().is_dir() {
            classify_directory(path, relative, mods_dir, delete_originals, &mut report);
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        classify_file(path, relative, mods_dir, xse_hashed_scripts, delete_originals, &mut report);
    }

    report
}

/// Copy `path` (a file or directory) to `CLASSIC Backup/Cleaned
/// Files/<relative>` under `mods_dir`, optionally removing the original
/// afterward. Failures are logged and otherwise swallowed — a file-scan
/// relocation failure must not abort the rest of the walk (spec §7).
fn relocate(path: &Path, relative: &Path, mods_dir: &Path, delete_original: bool) {
    let dest = mods_dir.join(BACKUP_DIR).join(relative);

    if path.is_dir() {
        if let Err(err) = copy_dir_recursive(path, &dest) {
            warn!("failed to relocate {} to {}: {err}", path.display(), dest.display());
            return;
        }
    } else {
        if let Some(parent) = dest.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("failed to create backup directory {}: {err}", parent.display());
                return;
            }
        }
        if let Err(err) = std::fs::copy(path, &dest) {
            warn!("failed to relocate {} to {}: {err}", path.display(), dest.display());
            return;
        }
    }

    if delete_original {
        let removed = if path.is_dir() { std::fs::remove_dir_all(path) } else { std::fs::remove_file(path) };
        if let Err(err) = removed {
            warn!("relocated {} but failed to remove the original: {err}", path.display());
        }
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).min_depth(1).into_iter().filter_map(Result::ok) {
        let target = dest.join(entry.path().strip_prefix(src).unwrap_or(entry.path()));
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn classify_directory(path: &Path, relative: &Path, mods_dir: &Path, delete_originals: bool, report: &mut ScanReport) {
    let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else { return };
    let dir_name_lower = dir_name.to_ascii_lowercase();

    if dir_name_lower == "fomod" {
        relocate(path, relative, mods_dir, delete_originals);
        report.fomod_relocated.insert(relative.to_string_lossy().into_owned());
    } else if dir_name_lower == "animationfiledata" {
        report.animation_file_data.insert(relative.to_string_lossy().into_owned());
    }
}

#[allow(clippy::too_many_arguments)]
fn classify_file(
    path: &Path,
    relative: &Path,
    mods_dir: &Path,
    xse_hashed_scripts: &HashSet<String>,
    delete_originals: bool,
    report: &mut ScanReport,
) {
    let is_doc = classify_relative_path(relative, xse_hashed_scripts, report);
    if is_doc {
        relocate(path, relative, mods_dir, delete_originals);
        return;
    }

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    if extension == "dds" {
        classify_dds(path, &relative.to_string_lossy(), report);
    }
}

/// Classify a single file purely from its path relative to the mod/archive
/// root, with no filesystem access — shared by the loose mod-staging walk
/// (`classify_file`) and the GNRL archive listing classifier (spec §4.11:
/// "the same per-file classifiers as the loose scan"). Returns `true` when
/// the path is a relocatable documentation file; callers that have a real
/// file to move act on that, archive listings just record the category.
pub(crate) fn classify_relative_path(
    relative: &Path,
    xse_hashed_scripts: &HashSet<String>,
    report: &mut ScanReport,
) -> bool {
    let Some(file_name) = relative.file_name().and_then(|n| n.to_str()) else { return false };
    let file_name_lower = file_name.to_ascii_lowercase();
    let extension = relative.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let relative_str = relative.to_string_lossy().into_owned();

    if is_documentation(&file_name_lower, &extension) {
        report.documentation_relocated.insert(relative_str);
        return true;
    }

    match extension.as_str() {
        "tga" | "png" => {
            if !path_contains_segment(relative, "bodyslide") {
                report.wrong_texture_format.insert(relative_str.clone());
            }
        }
        "mp3" | "m4a" => {
            report.wrong_sound_format.insert(relative_str.clone());
        }
        _ => {}
    }

    if path_contains_segment(relative, "scripts")
        && xse_hashed_scripts.contains(file_name)
        && !path_contains_segment(relative, "workshop framework")
    {
        report.xse_script_copies.insert(relative_str.clone());
    }

    if file_name_lower.ends_with(".uvd") || file_name_lower.ends_with("_oc.nif") {
        report.previs_loose_files.insert(relative_str);
    }

    false
}

fn is_documentation(file_name_lower: &str, extension: &str) -> bool {
    let stem_matches = DOC_NAME_FRAGMENTS.iter().any(|frag| file_name_lower.contains(frag));
    let ext_matches = DOC_EXTENSIONS.contains(&extension) || extension == "docx";
    stem_matches && ext_matches
}

fn path_contains_segment(relative: &Path, segment: &str) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(segment))
}

fn classify_dds(path: &Path, relative_str: &str, report: &mut ScanReport) {
    let Ok(header) = read_dds_header(path) else { return };
    if &header[0..4] != b"DDS " {
        return;
    }
    let width = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
    let height = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
    if width % 2 != 0 || height % 2 != 0 {
        report.bad_texture_dimensions.insert(relative_str.to_string());
    }
}

fn read_dds_header(path: &Path) -> std::io::Result<[u8; DDS_HEADER_LEN]> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; DDS_HEADER_LEN];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_documentation_by_name_and_extension() {
        assert!(is_documentation("readme.txt", "txt"));
        assert!(is_documentation("changelog.pdf", "pdf"));
        assert!(!is_documentation("readme.txt", "esp"));
        assert!(!is_documentation("plugin.esp", "esp"));
    }

    #[test]
    fn dds_header_flags_odd_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dds");
        let mut header = [0u8; DDS_HEADER_LEN];
        header[0..4].copy_from_slice(b"DDS ");
        header[12..16].copy_from_slice(&101u32.to_le_bytes());
        header[16..20].copy_from_slice(&64u32.to_le_bytes());
        std::fs::write(&path, header).unwrap();

        let mut report = ScanReport::new();
        classify_dds(&path, "bad.dds", &mut report);
        assert!(report.bad_texture_dimensions.items.contains("bad.dds"));
    }

    #[test]
    fn dds_header_allows_even_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.dds");
        let mut header = [0u8; DDS_HEADER_LEN];
        header[0..4].copy_from_slice(b"DDS ");
        header[12..16].copy_from_slice(&128u32.to_le_bytes());
        header[16..20].copy_from_slice(&128u32.to_le_bytes());
        std::fs::write(&path, header).unwrap();

        let mut report = ScanReport::new();
        classify_dds(&path, "good.dds", &mut report);
        assert!(report.bad_texture_dimensions.is_empty());
    }

    #[test]
    fn bodyslide_path_is_exempt_from_texture_format_flag() {
        let relative = Path::new("BodySlide/texture.tga");
        assert!(path_contains_segment(relative, "bodyslide"));
    }

    #[test]
    fn full_scan_classifies_mixed_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hi").unwrap();
        std::fs::create_dir_all(dir.path().join("fomod")).unwrap();
        std::fs::write(dir.path().join("preview.tga"), "x").unwrap();
        std::fs::create_dir_all(dir.path().join("BodySlide")).unwrap();
        std::fs::write(dir.path().join("BodySlide/preview.tga"), "x").unwrap();
        std::fs::write(dir.path().join("music.mp3"), "x").unwrap();

        let report = scan(dir.path(), &HashSet::new(), false);
        assert!(!report.documentation_relocated.is_empty());
        assert!(!report.fomod_relocated.is_empty());
        assert_eq!(report.wrong_texture_format.items.len(), 1);
        assert!(!report.wrong_sound_format.is_empty());

        let backup = dir.path().join(BACKUP_DIR);
        assert!(backup.join("readme.txt").exists());
        assert!(backup.join("fomod").is_dir());
        assert!(dir.path().join("readme.txt").exists(), "delete_originals=false must keep the source");
    }

    #[test]
    fn relocation_deletes_original_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hi").unwrap();

        let report = scan(dir.path(), &HashSet::new(), true);
        assert!(!report.documentation_relocated.is_empty());
        assert!(dir.path().join(BACKUP_DIR).join("readme.txt").exists());
        assert!(!dir.path().join("readme.txt").exists(), "delete_originals=true must remove the source");
    }
}
