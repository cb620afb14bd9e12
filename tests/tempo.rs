use approx::assert_abs_diff_eq;
use ndarray::Array2;
use stem_refinery_core::core::tempo::{
    bar_duration, bars_to_seconds, midi_tempo, midi_time_signature, resolve_tempo, TempoSource,
    DEFAULT_TEMPO,
};
use stem_refinery_core::error::RefineryError;
use stem_refinery_core::types::{TempoEvent, TimeSignatureEvent};
use stem_refinery_core::{AudioBuffer, BpmEstimator, MidiData, TimeSignature, TimeWindow};

struct FixedEstimator(f64);

impl BpmEstimator for FixedEstimator {
    fn estimate(&self, _mono: &[f32], _sample_rate: u32) -> stem_refinery_core::Result<f64> {
        Ok(self.0)
    }
}

struct PanicEstimator;

impl BpmEstimator for PanicEstimator {
    fn estimate(&self, _mono: &[f32], _sample_rate: u32) -> stem_refinery_core::Result<f64> {
        panic!("estimator must not run when a tempo is known");
    }
}

fn silence(frames: usize) -> AudioBuffer {
    AudioBuffer::new(Array2::zeros((2, frames)), 44100)
}

fn midi_with_tempos(bpms: &[f64]) -> MidiData {
    MidiData {
        tempo_events: bpms
            .iter()
            .enumerate()
            .map(|(i, &bpm)| TempoEvent {
                time: i as f64,
                bpm,
            })
            .collect(),
        ..MidiData::default()
    }
}

#[test]
fn one_bar_of_four_four_at_120_is_two_seconds() {
    let sig = TimeSignature::default();
    assert_abs_diff_eq!(bar_duration(120.0, sig), 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(bars_to_seconds(8.0, 120.0, sig), 16.0, epsilon = 1e-12);
    assert_abs_diff_eq!(bars_to_seconds(1.0, 90.0, TimeSignature::new(3, 4)), 2.0, epsilon = 1e-12);
}

#[test]
fn bars_to_seconds_is_linear_and_zero_at_zero() {
    let sig = TimeSignature::new(7, 8);
    for tempo in [60.0, 97.5, 128.0, 174.0] {
        assert_eq!(bars_to_seconds(0.0, tempo, sig), 0.0);
        for (a, b) in [(1.0, 2.0), (0.25, 3.5), (16.0, 0.0)] {
            assert_abs_diff_eq!(
                bars_to_seconds(a + b, tempo, sig),
                bars_to_seconds(a, tempo, sig) + bars_to_seconds(b, tempo, sig),
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn time_window_converts_bars() {
    let w = TimeWindow::new(2.0, 4.0, 120.0, TimeSignature::default()).unwrap();
    assert_abs_diff_eq!(w.start_seconds(), 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w.end_seconds(), 8.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w.bar_duration(), 2.0, epsilon = 1e-12);
}

#[test]
fn time_window_rejects_bad_input() {
    let sig = TimeSignature::default();
    let bad = [
        TimeWindow::new(4.0, 4.0, 120.0, sig),
        TimeWindow::new(4.0, 2.0, 120.0, sig),
        TimeWindow::new(-1.0, 2.0, 120.0, sig),
        TimeWindow::new(0.0, 2.0, 0.0, sig),
        TimeWindow::new(0.0, 2.0, f64::NAN, sig),
        TimeWindow::new(0.0, 2.0, 120.0, TimeSignature::new(0, 4)),
    ];
    for result in bad {
        assert!(matches!(result, Err(RefineryError::InvalidWindow(_))));
    }
}

#[test]
fn midi_defaults_when_events_missing() {
    let empty = MidiData::default();
    assert_eq!(midi_tempo(&empty), DEFAULT_TEMPO);
    assert_eq!(midi_time_signature(&empty), TimeSignature::new(4, 4));

    let mut midi = midi_with_tempos(&[95.0]);
    midi.time_signature_events.push(TimeSignatureEvent {
        time: 0.0,
        numerator: 6,
        denominator: 8,
    });
    assert_eq!(midi_tempo(&midi), 95.0);
    assert_eq!(midi_time_signature(&midi), TimeSignature::new(6, 8));
}

#[test]
fn midi_tempo_wins_over_explicit_and_estimate() {
    let midi = midi_with_tempos(&[128.0]);
    let resolved = resolve_tempo(
        Some(&midi),
        Some(90.0),
        Some(TimeSignature::new(3, 4)),
        &silence(100),
        &PanicEstimator,
    )
    .unwrap();
    assert_eq!(resolved.bpm, 128.0);
    assert_eq!(resolved.source, TempoSource::Midi);
    assert_eq!(resolved.time_signature, TimeSignature::default());
    assert!(!resolved.has_tempo_map);
}

#[test]
fn tempo_map_is_flattened_to_first_tempo() {
    let midi = midi_with_tempos(&[100.0, 140.0, 80.0]);
    let resolved = resolve_tempo(Some(&midi), None, None, &silence(100), &PanicEstimator).unwrap();
    assert_eq!(resolved.bpm, 100.0);
    assert!(resolved.has_tempo_map);
}

#[test]
fn explicit_tempo_used_without_midi() {
    let resolved = resolve_tempo(
        None,
        Some(87.0),
        Some(TimeSignature::new(3, 4)),
        &silence(100),
        &PanicEstimator,
    )
    .unwrap();
    assert_eq!(resolved.bpm, 87.0);
    assert_eq!(resolved.source, TempoSource::Explicit);
    assert_eq!(resolved.time_signature, TimeSignature::new(3, 4));
}

#[test]
fn estimator_used_as_last_resort() {
    let resolved = resolve_tempo(None, None, None, &silence(100), &FixedEstimator(126.0)).unwrap();
    assert_eq!(resolved.bpm, 126.0);
    assert_eq!(resolved.source, TempoSource::Estimated);
    assert_eq!(resolved.time_signature, TimeSignature::default());
}
