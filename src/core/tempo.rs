use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    core::bpm::BpmEstimator,
    error::{RefineryError, Result},
    types::{AudioBuffer, MidiData, TimeSignature},
};

pub const DEFAULT_TEMPO: f64 = 120.0;

pub fn seconds_per_beat(tempo: f64) -> f64 {
    60.0 / tempo
}

pub fn bar_duration(tempo: f64, sig: TimeSignature) -> f64 {
    sig.beats_per_bar as f64 * seconds_per_beat(tempo)
}

pub fn bars_to_seconds(bars: f64, tempo: f64, sig: TimeSignature) -> f64 {
    bars * bar_duration(tempo, sig)
}

/// A bar range at a fixed tempo and meter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    start_bars: f64,
    end_bars: f64,
    tempo: f64,
    time_signature: TimeSignature,
}

impl TimeWindow {
    pub fn new(start_bars: f64, end_bars: f64, tempo: f64, time_signature: TimeSignature) -> Result<Self> {
        if !(tempo.is_finite() && tempo > 0.0) {
            return Err(RefineryError::InvalidWindow(format!("tempo must be positive, got {tempo}")));
        }
        if time_signature.beats_per_bar == 0 {
            return Err(RefineryError::InvalidWindow("time signature has zero beats per bar".into()));
        }
        if !(start_bars.is_finite() && start_bars >= 0.0) {
            return Err(RefineryError::InvalidWindow(format!("start bar must be >= 0, got {start_bars}")));
        }
        if !(end_bars.is_finite() && end_bars > start_bars) {
            return Err(RefineryError::InvalidWindow(format!(
                "end bar {end_bars} must be after start bar {start_bars}"
            )));
        }
        Ok(Self {
            start_bars,
            end_bars,
            tempo,
            time_signature,
        })
    }

    pub fn start_bars(&self) -> f64 {
        self.start_bars
    }

    pub fn end_bars(&self) -> f64 {
        self.end_bars
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn bar_duration(&self) -> f64 {
        bar_duration(self.tempo, self.time_signature)
    }

    pub fn start_seconds(&self) -> f64 {
        bars_to_seconds(self.start_bars, self.tempo, self.time_signature)
    }

    pub fn end_seconds(&self) -> f64 {
        bars_to_seconds(self.end_bars, self.tempo, self.time_signature)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoSource {
    Midi,
    Explicit,
    Estimated,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTempo {
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub source: TempoSource,
    /// The MIDI file had several tempo events; only the first was used.
    pub has_tempo_map: bool,
}

/// First tempo event, or 120 BPM.
pub fn midi_tempo(midi: &MidiData) -> f64 {
    midi.tempo_events
        .first()
        .map(|t| t.bpm)
        .unwrap_or(DEFAULT_TEMPO)
}

/// First time signature event, or 4/4.
pub fn midi_time_signature(midi: &MidiData) -> TimeSignature {
    midi.time_signature_events
        .first()
        .map(|ts| TimeSignature::new(ts.numerator, ts.denominator))
        .unwrap_or_default()
}

/// Pick the tempo/meter used to turn bars into seconds.
///
/// Paired MIDI wins over an explicit tempo, which wins over estimation from the
/// audio. The estimator only runs when neither of the others is available.
pub fn resolve_tempo(
    midi: Option<&MidiData>,
    explicit_tempo: Option<f64>,
    time_signature: Option<TimeSignature>,
    audio: &AudioBuffer,
    estimator: &dyn BpmEstimator,
) -> Result<ResolvedTempo> {
    if let Some(midi) = midi {
        let bpm = midi_tempo(midi);
        let has_tempo_map = midi.has_tempo_map();
        if has_tempo_map {
            warn!(
                tempo_changes = midi.tempo_events.len(),
                bpm, "MIDI tempo map flattened to its first tempo"
            );
        }
        return Ok(ResolvedTempo {
            bpm,
            time_signature: midi_time_signature(midi),
            source: TempoSource::Midi,
            has_tempo_map,
        });
    }

    if let Some(bpm) = explicit_tempo {
        return Ok(ResolvedTempo {
            bpm,
            time_signature: time_signature.unwrap_or_default(),
            source: TempoSource::Explicit,
            has_tempo_map: false,
        });
    }

    let mono = audio.mono_mix();
    let bpm = estimator.estimate(&mono, audio.sample_rate)?;
    debug!(bpm, "estimated tempo from audio");
    Ok(ResolvedTempo {
        bpm,
        time_signature: time_signature.unwrap_or_default(),
        source: TempoSource::Estimated,
        has_tempo_map: false,
    })
}
