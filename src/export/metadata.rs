use std::{collections::BTreeSet, fmt, fs, io::Write, path::Path};

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    config::Taxonomy,
    error::Result,
    io::audio::{OUTPUT_BIT_DEPTH, OUTPUT_SAMPLE_RATE},
    types::{TrackInfo, VocalRights},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalAttributes {
    pub genre_parent: String,
    pub genre_sub: String,
    pub bpm: f64,
    pub key: String,
    pub time_signature: String,
    pub energy_level: u8,
    pub moods: Vec<String>,
    pub vocal_rights: VocalRights,
    pub contains_ai: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StemManifestEntry {
    pub group: String,
    pub instrument: String,
    pub layer: String,
    pub is_mono: bool,
    pub original_filename: String,
    pub audio_file: String,
    #[serde(default)]
    pub midi_file: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StemManifestEntry {
    pub fn same_slot(&self, other: &StemManifestEntry) -> bool {
        self.group == other.group && self.instrument == other.instrument && self.layer == other.layer
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub date_processed: NaiveDate,
    pub app_version: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechSpecs {
    pub sample_rate: u32,
    pub bit_depth: u16,
}

impl Default for TechSpecs {
    fn default() -> Self {
        Self {
            sample_rate: OUTPUT_SAMPLE_RATE,
            bit_depth: OUTPUT_BIT_DEPTH,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCount {
    pub audio: usize,
    pub midi: usize,
}

/// Per-track `{uid}_info.json` document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub uid: String,
    pub original_track_title: String,
    pub original_folder_name: String,
    pub global_attributes: GlobalAttributes,
    pub stems_manifest: Vec<StemManifestEntry>,
    pub processing_info: ProcessingInfo,
    pub tech_specs: TechSpecs,
    pub file_count: FileCount,
}

fn lower_snake(s: &str) -> String {
    s.trim().to_lowercase().replace(' ', "_")
}

impl TrackMetadata {
    pub fn new(
        info: &TrackInfo,
        stems: Vec<StemManifestEntry>,
        date_processed: NaiveDate,
        app_version: &str,
    ) -> Self {
        let genre_parent = if info.genre_parent.trim().is_empty() {
            &info.genre
        } else {
            &info.genre_parent
        };
        let file_count = FileCount {
            audio: stems.len(),
            // Layers of one instrument share a MIDI file.
            midi: stems
                .iter()
                .filter_map(|s| s.midi_file.as_deref())
                .collect::<BTreeSet<_>>()
                .len(),
        };

        Self {
            uid: info.uid.clone(),
            original_track_title: info.title.clone(),
            original_folder_name: info.original_folder.clone(),
            global_attributes: GlobalAttributes {
                genre_parent: lower_snake(genre_parent),
                genre_sub: lower_snake(&info.genre_sub),
                bpm: info.bpm,
                key: info.key.clone(),
                time_signature: info.time_signature.to_string(),
                energy_level: info.energy_level,
                moods: info.moods.iter().map(|m| m.trim().to_lowercase()).collect(),
                vocal_rights: info.vocal_rights,
                contains_ai: info.contains_ai,
            },
            stems_manifest: stems,
            processing_info: ProcessingInfo {
                date_processed,
                app_version: app_version.to_string(),
            },
            tech_specs: TechSpecs::default(),
            file_count,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write via a temp file in the target directory, then rename over `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .with_context(|| format!("metadata path has no parent: {:?}", path))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.to_json()?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataIssue {
    UidPrefix { expected: String },
    BpmOutOfRange(f64),
    UnknownGenre(String),
    EnergyOutOfRange(u8),
    TooManyMoods(usize),
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataIssue::UidPrefix { expected } => write!(f, "UID must start with '{expected}'"),
            MetadataIssue::BpmOutOfRange(bpm) => {
                write!(f, "BPM {bpm} is outside valid range (40-300)")
            }
            MetadataIssue::UnknownGenre(g) => write!(f, "Genre parent '{g}' not in taxonomy"),
            MetadataIssue::EnergyOutOfRange(e) => write!(f, "energy_level must be 1-5, got {e}"),
            MetadataIssue::TooManyMoods(n) => write!(f, "Maximum 2 mood tags allowed, got {n}"),
        }
    }
}

pub fn validate_metadata(meta: &TrackMetadata, uid_prefix: &str, taxonomy: &Taxonomy) -> Vec<MetadataIssue> {
    let mut issues = Vec::new();
    let attrs = &meta.global_attributes;

    let expected = format!("{uid_prefix}_");
    if !meta.uid.starts_with(&expected) {
        issues.push(MetadataIssue::UidPrefix { expected });
    }
    if !(40.0..=300.0).contains(&attrs.bpm) {
        issues.push(MetadataIssue::BpmOutOfRange(attrs.bpm));
    }
    if !taxonomy.parent_genres.contains_key(&attrs.genre_parent) {
        issues.push(MetadataIssue::UnknownGenre(attrs.genre_parent.clone()));
    }
    if !(1..=5).contains(&attrs.energy_level) {
        issues.push(MetadataIssue::EnergyOutOfRange(attrs.energy_level));
    }
    if attrs.moods.len() > 2 {
        issues.push(MetadataIssue::TooManyMoods(attrs.moods.len()));
    }

    issues
}
