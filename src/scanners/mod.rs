//! Auxiliary file-level analyzers: loose-file mod scan, BA2 archive scan,
//! crashgen-settings checker, and log-error scan (spec §4.11, §4.12).
//!
//! Each scanner accumulates findings into sorted, de-duplicated sets per
//! category rather than an ordered `Vec`, matching the "accumulate into a
//! set, sort ascending at render" output contract spec.md §4.11 specifies.

pub mod archive_scan;
pub mod crashgen_check;
pub mod log_errors;
pub mod mods_scan;

use std::collections::BTreeSet;

/// One category of file-scan findings, rendered as a header plus its
/// sorted, de-duplicated items.
#[derive(Debug, Clone, Default)]
pub struct ScanCategory {
    pub title: &'static str,
    pub items: BTreeSet<String>,
}

impl ScanCategory {
    pub fn new(title: &'static str) -> Self {
        Self { title, items: BTreeSet::new() }
    }

    pub fn insert(&mut self, item: impl Into<String>) {
        self.items.insert(item.into());
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The full set of categories produced by a single loose-file/archive scan
/// pass, keyed by category so callers can merge two passes together.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub documentation_relocated: ScanCategory,
    pub fomod_relocated: ScanCategory,
    pub animation_file_data: ScanCategory,
    pub bad_texture_dimensions: ScanCategory,
    pub wrong_texture_format: ScanCategory,
    pub wrong_sound_format: ScanCategory,
    pub xse_script_copies: ScanCategory,
    pub previs_loose_files: ScanCategory,
    pub ba2_wrong_format: ScanCategory,
}

impl ScanReport {
    pub fn new() -> Self {
        Self {
            documentation_relocated: ScanCategory::new("Documentation Files Relocated"),
            fomod_relocated: ScanCategory::new("FOMOD Folders Relocated"),
            animation_file_data: ScanCategory::new("Custom Animation File Data"),
            bad_texture_dimensions: ScanCategory::new("Textures With Invalid Dimensions"),
            wrong_texture_format: ScanCategory::new("Textures In The Wrong Format"),
            wrong_sound_format: ScanCategory::new("Sounds In The Wrong Format"),
            xse_script_copies: ScanCategory::new("Stray Script Extender Copies"),
            previs_loose_files: ScanCategory::new("Loose Previs Files"),
            ba2_wrong_format: ScanCategory::new("Archives With Invalid Format"),
        }
    }

    pub fn merge(&mut self, other: ScanReport) {
        self.documentation_relocated.items.extend(other.documentation_relocated.items);
        self.fomod_relocated.items.extend(other.fomod_relocated.items);
        self.animation_file_data.items.extend(other.animation_file_data.items);
        self.bad_texture_dimensions.items.extend(other.bad_texture_dimensions.items);
        self.wrong_texture_format.items.extend(other.wrong_texture_format.items);
        self.wrong_sound_format.items.extend(other.wrong_sound_format.items);
        self.xse_script_copies.items.extend(other.xse_script_copies.items);
        self.previs_loose_files.items.extend(other.previs_loose_files.items);
        self.ba2_wrong_format.items.extend(other.ba2_wrong_format.items);
    }

    pub fn categories(&self) -> [&ScanCategory; 9] {
        [
            &self.documentation_relocated,
            &self.fomod_relocated,
            &self.animation_file_data,
            &self.bad_texture_dimensions,
            &self.wrong_texture_format,
            &self.wrong_sound_format,
            &self.xse_script_copies,
            &self.previs_loose_files,
            &self.ba2_wrong_format,
        ]
    }
}
