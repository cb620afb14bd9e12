use std::fmt;

use serde::Serialize;

use crate::{config::Taxonomy, types::StemClassification};

/// Advisory findings for a labelled stem. None of these block export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StemWarning {
    MissingMidi { group: String },
    ShouldBeMono { instrument: String },
    ShouldBeStereo { instrument: String },
    UnknownGroup { group: String },
    UnknownInstrument { group: String, instrument: String },
    UnknownLayer { layer: String },
}

impl fmt::Display for StemWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StemWarning::MissingMidi { group } => {
                write!(f, "{group} stems typically require MIDI pairing")
            }
            StemWarning::ShouldBeMono { instrument } => write!(f, "{instrument} should be MONO"),
            StemWarning::ShouldBeStereo { instrument } => {
                write!(f, "{instrument} should be STEREO")
            }
            StemWarning::UnknownGroup { group } => write!(f, "'{group}' is not a known group"),
            StemWarning::UnknownInstrument { group, instrument } => {
                write!(f, "'{instrument}' is not a standard option for {group}")
            }
            StemWarning::UnknownLayer { layer } => {
                write!(f, "'{layer}' is not a standard layer type")
            }
        }
    }
}

/// Mono/stereo, MIDI and vocabulary rules driven by a [`Taxonomy`].
#[derive(Clone, Debug, Default)]
pub struct StemValidator {
    taxonomy: Taxonomy,
}

impl StemValidator {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn should_force_mono(&self, group: &str, instrument: &str) -> bool {
        self.taxonomy.force_mono_instruments.iter().any(|i| i == instrument)
            || (group == "Vocal" && instrument == "Lead")
            || (group == "Drums" && instrument == "Snare")
    }

    pub fn should_keep_stereo(&self, group: &str, instrument: &str) -> bool {
        self.taxonomy.keep_stereo_groups.iter().any(|g| g == group)
            || self.taxonomy.keep_stereo_instruments.iter().any(|i| i == instrument)
    }

    pub fn requires_midi(&self, group: &str) -> bool {
        self.taxonomy.midi_required_groups.iter().any(|g| g == group)
    }

    pub fn validate_stem(
        &self,
        group: &str,
        instrument: &str,
        layer: &str,
        has_midi: bool,
        is_mono: bool,
    ) -> Vec<StemWarning> {
        let mut warnings = Vec::new();

        if self.requires_midi(group) && !has_midi {
            warnings.push(StemWarning::MissingMidi {
                group: group.to_string(),
            });
        }

        if self.should_force_mono(group, instrument) && !is_mono {
            warnings.push(StemWarning::ShouldBeMono {
                instrument: instrument.to_string(),
            });
        }
        if self.should_keep_stereo(group, instrument) && is_mono {
            warnings.push(StemWarning::ShouldBeStereo {
                instrument: instrument.to_string(),
            });
        }

        match self.taxonomy.instruments_for(group) {
            Some(allowed) => {
                let escape = instrument == self.taxonomy.other_value;
                if !escape && !allowed.iter().any(|i| i == instrument) {
                    warnings.push(StemWarning::UnknownInstrument {
                        group: group.to_string(),
                        instrument: instrument.to_string(),
                    });
                }
            }
            None if !self.taxonomy.has_group(group) => {
                warnings.push(StemWarning::UnknownGroup {
                    group: group.to_string(),
                });
            }
            None => {}
        }

        if !self.taxonomy.has_layer(layer) {
            warnings.push(StemWarning::UnknownLayer {
                layer: layer.to_string(),
            });
        }

        warnings
    }

    pub fn validate_classification(
        &self,
        class: &StemClassification,
        has_midi: bool,
        is_mono: bool,
    ) -> Vec<StemWarning> {
        self.validate_stem(&class.group, &class.instrument, &class.layer, has_midi, is_mono)
    }

    /// Whether an export of this stem should be mixed down to one channel.
    pub fn wants_mono(&self, class: &StemClassification) -> bool {
        class.force_mono || self.should_force_mono(&class.group, &class.instrument)
    }
}
