use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    core::pairing::VocalPolicy,
    error::{RefineryError, Result},
    types::VocalRights,
};

const TAXONOMY_JSON: &str = include_str!("../taxonomy/taxonomy.json");

pub const OUTPUT_ROOT_ENV: &str = "STEM_REFINERY_OUTPUT_ROOT";
pub const TAXONOMY_ENV: &str = "STEM_REFINERY_TAXONOMY";

/// Closed vocabulary for labels plus the mono/stereo and MIDI policy tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub version: String,
    pub groups: Vec<String>,
    pub instruments: BTreeMap<String, Vec<String>>,
    pub layers: Vec<String>,
    /// Escape value accepted for any group without a whitelist warning.
    #[serde(default = "default_other_value")]
    pub other_value: String,
    pub force_mono_instruments: Vec<String>,
    pub keep_stereo_groups: Vec<String>,
    pub keep_stereo_instruments: Vec<String>,
    pub midi_required_groups: Vec<String>,
    #[serde(default)]
    pub parent_genres: BTreeMap<String, String>,
    #[serde(default)]
    pub sub_genres: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub moods: Vec<String>,
}

fn default_other_value() -> String {
    "Other".into()
}

impl Taxonomy {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RefineryError::Config(format!("taxonomy: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn instruments_for(&self, group: &str) -> Option<&[String]> {
        self.instruments.get(group).map(Vec::as_slice)
    }

    pub fn has_layer(&self, layer: &str) -> bool {
        self.layers.iter().any(|l| l == layer)
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::from_json_str(TAXONOMY_JSON).expect("embedded taxonomy.json must parse")
    }
}

/// Runtime settings for a refinery run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineryConfig {
    /// Minimum similarity (0-100) for an automatic audio/MIDI pairing.
    pub match_threshold: f64,
    pub vocal_keywords: Vec<String>,
    pub vocal_rights: VocalRights,
    /// Overrides the policy implied by `vocal_rights`.
    pub vocal_policy: Option<VocalPolicy>,
    pub output_root: PathBuf,
    pub batch_prefix: String,
    pub uid_prefix: String,
    pub uid_padding: usize,
    pub start_bars: f64,
    pub end_bars: f64,
    pub app_version: String,
    pub taxonomy: Taxonomy,
}

impl Default for RefineryConfig {
    fn default() -> Self {
        Self {
            match_threshold: 70.0,
            vocal_keywords: [
                "vocal",
                "vox",
                "voice",
                "singer",
                "lead_vocal",
                "harmony",
                "adlib",
                "choir",
                "speech",
                "lyrics",
                "acapella",
                "accapella",
                "acappella",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            vocal_rights: VocalRights::Exclusive,
            vocal_policy: None,
            output_root: PathBuf::from("Clean_Dataset_Staging"),
            batch_prefix: "Batch".into(),
            uid_prefix: "GP".into(),
            uid_padding: 5,
            start_bars: 0.0,
            end_bars: 16.0,
            app_version: concat!("v", env!("CARGO_PKG_VERSION")).into(),
            taxonomy: Taxonomy::default(),
        }
    }
}

impl RefineryConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read a TOML config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&raw)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(root) = env::var(OUTPUT_ROOT_ENV) {
            self.output_root = PathBuf::from(root);
        }
        if let Ok(path) = env::var(TAXONOMY_ENV) {
            self.taxonomy = Taxonomy::from_json_file(Path::new(&path))?;
        }
        Ok(())
    }

    pub fn effective_vocal_policy(&self) -> VocalPolicy {
        self.vocal_policy
            .unwrap_or_else(|| VocalPolicy::for_rights(self.vocal_rights))
    }
}

/// `drums` -> `Drums`, `fx` -> `FX`.
pub fn normalize_group(group: &str) -> String {
    let trimmed = group.trim();
    if trimmed.eq_ignore_ascii_case("fx") {
        return "FX".into();
    }
    capitalize(trimmed)
}

/// `hat closed` -> `Hat_Closed`, `sub_bass` -> `Sub_Bass`.
pub fn normalize_instrument(instrument: &str) -> String {
    title_snake(instrument)
}

/// `one_shot` -> `One_Shot`, `main` -> `Main`.
pub fn normalize_layer(layer: &str) -> String {
    title_snake(layer)
}

fn title_snake(s: &str) -> String {
    s.trim()
        .replace(' ', "_")
        .split('_')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("_")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_taxonomy_parses() {
        let t = Taxonomy::default();
        assert_eq!(t.groups.len(), 7);
        assert!(t.instruments_for("Drums").unwrap().contains(&"Kick".to_string()));
        assert!(t.has_layer("One_Shot"));
        assert_eq!(t.other_value, "Other");
    }

    #[test]
    fn label_normalization() {
        assert_eq!(normalize_group("drums"), "Drums");
        assert_eq!(normalize_group("BASS"), "Bass");
        assert_eq!(normalize_group("fx"), "FX");
        assert_eq!(normalize_instrument("sub_bass"), "Sub_Bass");
        assert_eq!(normalize_instrument("hat closed"), "Hat_Closed");
        assert_eq!(normalize_instrument("kick"), "Kick");
        assert_eq!(normalize_layer("one_shot"), "One_Shot");
        assert_eq!(normalize_layer("main"), "Main");
    }

    #[test]
    fn toml_overrides_keep_defaults() {
        let cfg = RefineryConfig::from_toml_str(
            r#"
match_threshold = 80.0
vocal_rights = "royalty_free"
uid_prefix = "XX"
"#,
        )
        .unwrap();
        assert_eq!(cfg.match_threshold, 80.0);
        assert_eq!(cfg.uid_prefix, "XX");
        assert_eq!(cfg.uid_padding, 5);
        assert_eq!(cfg.effective_vocal_policy(), VocalPolicy::Exclude);
        assert_eq!(cfg.taxonomy, Taxonomy::default());
    }
}
