//! Cut audio and MIDI to the same bar-aligned window.
//!
//! Bars are converted to seconds with a single resolved tempo. Audio is cut on
//! sample boundaries (`floor`); MIDI notes are clipped to the window and shifted
//! so the slice always starts at 0.

use std::path::Path;

use ndarray::s;
use serde::Serialize;
use tracing::debug;

use crate::{
    core::{
        bpm::{BpmEstimator, OnsetBpmEstimator},
        tempo::{resolve_tempo, ResolvedTempo, TimeWindow},
    },
    error::{RefineryError, Result},
    io::{
        audio::{read_audio, resample, OUTPUT_SAMPLE_RATE},
        midi::read_midi,
    },
    types::{AudioBuffer, MidiData, MidiInstrument, NoteEvent, TempoEvent, TimeSignature},
};

/// `[floor(start*sr), floor(end*sr))` on every channel.
///
/// Fails when the start lands at or past the end of the buffer; an end past
/// the buffer is clipped, never padded.
pub fn slice_audio(buffer: &AudioBuffer, start_secs: f64, end_secs: f64) -> Result<AudioBuffer> {
    if !(start_secs.is_finite() && start_secs >= 0.0) || !(end_secs >= start_secs) {
        return Err(RefineryError::InvalidWindow(format!(
            "cannot slice audio from {start_secs}s to {end_secs}s"
        )));
    }

    let sr = buffer.sample_rate as f64;
    let total = buffer.frames();
    let start = (start_secs * sr).floor() as usize;
    if start >= total {
        return Err(RefineryError::Range { start, total });
    }
    let end = ((end_secs * sr).floor() as usize).min(total);

    let samples = buffer.samples.slice(s![.., start..end]).to_owned();
    Ok(AudioBuffer::new(samples, buffer.sample_rate))
}

/// Notes overlapping `[start, end)`, clipped and shifted to start at 0.
pub fn slice_notes(notes: &[NoteEvent], start_secs: f64, end_secs: f64) -> Vec<NoteEvent> {
    notes
        .iter()
        .filter(|n| n.end > start_secs && n.start < end_secs)
        .filter_map(|n| {
            let start = n.start.max(start_secs) - start_secs;
            let end = n.end.min(end_secs) - start_secs;
            (end > start).then(|| NoteEvent::new(n.pitch, n.velocity, start, end))
        })
        .collect()
}

/// Window a whole MIDI structure.
///
/// The output carries one tempo event (`tempo` at 0). Time signatures inside
/// `[start, end]` are shifted along with the notes; instruments left without
/// notes are dropped.
pub fn slice_midi(midi: &MidiData, start_secs: f64, end_secs: f64, tempo: f64) -> MidiData {
    let time_signature_events = midi
        .time_signature_events
        .iter()
        .filter(|ts| ts.time >= start_secs && ts.time <= end_secs)
        .map(|ts| {
            let mut ts = *ts;
            ts.time -= start_secs;
            ts
        })
        .collect();

    let instruments = midi
        .instruments
        .iter()
        .filter_map(|inst| {
            let notes = slice_notes(&inst.notes, start_secs, end_secs);
            (!notes.is_empty()).then(|| MidiInstrument {
                name: inst.name.clone(),
                program: inst.program,
                is_drum: inst.is_drum,
                notes,
            })
        })
        .collect();

    MidiData {
        tempo_events: vec![TempoEvent {
            time: 0.0,
            bpm: tempo,
        }],
        time_signature_events,
        instruments,
    }
}

/// Bar range plus the optional overrides used when no MIDI is paired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceRequest {
    pub start_bars: f64,
    pub end_bars: f64,
    pub tempo: Option<f64>,
    pub time_signature: Option<TimeSignature>,
}

impl SliceRequest {
    pub fn bars(start_bars: f64, end_bars: f64) -> Self {
        Self {
            start_bars,
            end_bars,
            tempo: None,
            time_signature: None,
        }
    }

    pub fn with_tempo(mut self, tempo: f64) -> Self {
        self.tempo = Some(tempo);
        self
    }

    pub fn with_time_signature(mut self, sig: TimeSignature) -> Self {
        self.time_signature = Some(sig);
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SlicedStem {
    #[serde(skip)]
    pub audio: AudioBuffer,
    pub midi: Option<MidiData>,
    pub tempo: ResolvedTempo,
    pub window: TimeWindow,
}

pub struct AlignedSlicer {
    estimator: Box<dyn BpmEstimator>,
    target_sample_rate: u32,
}

impl Default for AlignedSlicer {
    fn default() -> Self {
        Self::new(Box::new(OnsetBpmEstimator::default()))
    }
}

impl AlignedSlicer {
    pub fn new(estimator: Box<dyn BpmEstimator>) -> Self {
        Self {
            estimator,
            target_sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }

    pub fn with_target_sample_rate(mut self, sample_rate: u32) -> Self {
        self.target_sample_rate = sample_rate;
        self
    }

    /// Load an audio file (and its MIDI, if paired) and cut both to the request.
    pub fn slice_pair(
        &self,
        audio_path: &Path,
        midi_path: Option<&Path>,
        request: &SliceRequest,
    ) -> Result<SlicedStem> {
        let mut audio = read_audio(audio_path)?;
        if audio.sample_rate != self.target_sample_rate {
            audio = resample(&audio, self.target_sample_rate)?;
        }
        let midi = midi_path.map(read_midi).transpose()?;
        self.slice_loaded(&audio, midi.as_ref(), request)
    }

    /// Same as [`slice_pair`](Self::slice_pair) for already-decoded input.
    pub fn slice_loaded(
        &self,
        audio: &AudioBuffer,
        midi: Option<&MidiData>,
        request: &SliceRequest,
    ) -> Result<SlicedStem> {
        let tempo = resolve_tempo(
            midi,
            request.tempo,
            request.time_signature,
            audio,
            self.estimator.as_ref(),
        )?;
        let window = TimeWindow::new(
            request.start_bars,
            request.end_bars,
            tempo.bpm,
            tempo.time_signature,
        )?;

        let (start, end) = (window.start_seconds(), window.end_seconds());
        let sliced_audio = slice_audio(audio, start, end)?;
        let sliced_midi = midi.map(|m| slice_midi(m, start, end, tempo.bpm));

        debug!(
            bpm = tempo.bpm,
            source = ?tempo.source,
            start,
            end,
            frames = sliced_audio.frames(),
            notes = sliced_midi.as_ref().map_or(0, MidiData::note_count),
            "sliced stem"
        );

        Ok(SlicedStem {
            audio: sliced_audio,
            midi: sliced_midi,
            tempo,
            window,
        })
    }
}
