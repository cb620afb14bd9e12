use std::{
    fmt,
    path::{Path, PathBuf},
};

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    config::{normalize_group, normalize_instrument, normalize_layer},
    core::pairing::normalize,
};

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// An audio file found during scanning. The normalized name is computed once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AudioAsset {
    path: PathBuf,
    filename: String,
    normalized_name: String,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = file_name_of(&path);
        let normalized_name = normalize(&filename);
        Self {
            path,
            filename,
            normalized_name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }
}

/// A MIDI file found during scanning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MidiAsset {
    path: PathBuf,
    filename: String,
    normalized_name: String,
}

impl MidiAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = file_name_of(&path);
        let normalized_name = normalize(&filename);
        Self {
            path,
            filename,
            normalized_name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }
}

/// Stable key for a stem, derived from the full audio path rather than the bare
/// filename so that identically named files in different folders never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StemId(String);

impl StemId {
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().replace('\\', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for StemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StemPair {
    pub id: StemId,
    pub audio: AudioAsset,
    pub midi: Option<MidiAsset>,
    /// Similarity in `[0, 100]`; 0 when no MIDI was matched.
    pub match_score: f64,
    pub is_vocal: bool,
}

impl StemPair {
    pub fn new(audio: AudioAsset, midi: Option<MidiAsset>, match_score: f64) -> Self {
        Self {
            id: StemId::from_path(audio.path()),
            audio,
            midi,
            match_score,
            is_vocal: false,
        }
    }

    /// Replace the automatic MIDI match with a manual choice (or none).
    ///
    /// A manual pick scores 100 unless it repeats the automatic match; clearing
    /// the MIDI scores 0.
    pub fn with_midi_override(mut self, midi: Option<MidiAsset>) -> Self {
        if midi != self.midi {
            self.match_score = if midi.is_some() { 100.0 } else { 0.0 };
        }
        self.midi = midi;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u8,
    pub beat_unit: u8,
}

impl TimeSignature {
    pub const fn new(beats_per_bar: u8, beat_unit: u8) -> Self {
        Self {
            beats_per_bar,
            beat_unit,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

/// A single note, times in seconds on the owning file's timeline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: u8, start: f64, end: f64) -> Self {
        Self {
            pitch,
            velocity,
            start,
            end,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    pub time: f64,
    pub bpm: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSignatureEvent {
    pub time: f64,
    pub numerator: u8,
    pub denominator: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiInstrument {
    pub name: String,
    pub program: u8,
    pub is_drum: bool,
    pub notes: Vec<NoteEvent>,
}

/// Decoded MIDI content with every timestamp already converted to seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiData {
    pub tempo_events: Vec<TempoEvent>,
    pub time_signature_events: Vec<TimeSignatureEvent>,
    pub instruments: Vec<MidiInstrument>,
}

impl MidiData {
    /// Time of the last note-off across all instruments.
    pub fn end_time(&self) -> f64 {
        self.instruments
            .iter()
            .flat_map(|i| i.notes.iter())
            .map(|n| n.end)
            .fold(0.0, f64::max)
    }

    pub fn note_count(&self) -> usize {
        self.instruments.iter().map(|i| i.notes.len()).sum()
    }

    /// More than one tempo change; only the first one is honoured.
    pub fn has_tempo_map(&self) -> bool {
        self.tempo_events.len() > 1
    }
}

/// Planar audio: one row per channel, one column per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build from interleaved samples as produced by decoders.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = interleaved.len() / channels;
        let samples = Array2::from_shape_fn((channels, frames), |(c, f)| {
            interleaved[f * channels + c]
        });
        Self::new(samples, sample_rate)
    }

    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let rows = channels.len();
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let samples = Array2::from_shape_fn((rows, frames), |(c, f)| channels[c][f]);
        Self::new(samples, sample_rate)
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_mono(&self) -> bool {
        self.channels() == 1
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average of all channels.
    pub fn mono_mix(&self) -> Vec<f32> {
        match self.samples.mean_axis(Axis(0)) {
            Some(mix) => mix.to_vec(),
            None => Vec::new(),
        }
    }

    pub fn to_mono(&self) -> AudioBuffer {
        if self.is_mono() {
            return self.clone();
        }
        let samples = self
            .samples
            .mean_axis(Axis(0))
            .map(|mix| mix.insert_axis(Axis(0)))
            .unwrap_or_else(|| Array2::zeros((1, 0)));
        AudioBuffer::new(samples, self.sample_rate)
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        self.samples.t().iter().copied().collect()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

/// Group/instrument/layer label supplied by whoever labels the stems.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemClassification {
    pub group: String,
    pub instrument: String,
    pub layer: String,
    #[serde(default)]
    pub force_mono: bool,
}

impl StemClassification {
    /// Labels are normalized to taxonomy casing on entry.
    pub fn new(group: &str, instrument: &str, layer: &str) -> Self {
        Self {
            group: normalize_group(group),
            instrument: normalize_instrument(instrument),
            layer: normalize_layer(layer),
            force_mono: false,
        }
    }

    pub fn forcing_mono(mut self) -> Self {
        self.force_mono = true;
        self
    }

    pub fn normalized(&self) -> Self {
        Self {
            force_mono: self.force_mono,
            ..Self::new(&self.group, &self.instrument, &self.layer)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocalRights {
    Exclusive,
    RoyaltyFree,
}

impl Default for VocalRights {
    fn default() -> Self {
        VocalRights::Exclusive
    }
}

impl fmt::Display for VocalRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VocalRights::Exclusive => f.write_str("exclusive"),
            VocalRights::RoyaltyFree => f.write_str("royalty_free"),
        }
    }
}

/// Track-level attributes supplied when a track export starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub original_folder: String,
    pub genre: String,
    #[serde(default)]
    pub genre_parent: String,
    #[serde(default)]
    pub genre_sub: String,
    pub bpm: f64,
    pub key: String,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default = "default_energy")]
    pub energy_level: u8,
    #[serde(default)]
    pub moods: Vec<String>,
    #[serde(default)]
    pub vocal_rights: VocalRights,
    #[serde(default)]
    pub contains_ai: bool,
}

fn default_energy() -> u8 {
    3
}
