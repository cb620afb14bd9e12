use approx::assert_abs_diff_eq;
use stem_refinery_core::core::bpm::{BpmConfig, OnsetBpmEstimator};
use stem_refinery_core::BpmEstimator;

const SR: u32 = 44_100;

/// Short 1 kHz bursts every `60 / bpm` seconds, starting a quarter second in.
fn click_train(bpm: f64, clicks: usize) -> Vec<f32> {
    let period = (60.0 / bpm * SR as f64) as usize;
    let offset = SR as usize / 4;
    let burst = SR as usize / 100;
    let mut signal = vec![0.0f32; offset + period * (clicks + 1)];
    for c in 0..clicks {
        let at = offset + c * period;
        for i in 0..burst {
            let t = i as f32 / SR as f32;
            signal[at + i] = 0.9 * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
        }
    }
    signal
}

#[test]
fn click_train_at_120() {
    let est = OnsetBpmEstimator::default();
    let bpm = est.estimate(&click_train(120.0, 20), SR).unwrap();
    assert_abs_diff_eq!(bpm, 120.0, epsilon = 1.5);
}

#[test]
fn click_train_at_100() {
    let est = OnsetBpmEstimator::default();
    let bpm = est.estimate(&click_train(100.0, 20), SR).unwrap();
    assert_abs_diff_eq!(bpm, 100.0, epsilon = 1.5);
}

#[test]
fn onsets_land_on_the_clicks() {
    let est = OnsetBpmEstimator::default();
    let onsets = est.detect_onsets(&click_train(120.0, 8), SR);
    assert!(onsets.len() >= 7, "found {} onsets", onsets.len());
    for pair in onsets.windows(2) {
        assert_abs_diff_eq!(pair[1] - pair[0], 0.5, epsilon = 0.025);
    }
}

#[test]
fn too_few_onsets_fall_back_to_120() {
    let est = OnsetBpmEstimator::default();
    let bpm = est.estimate(&click_train(90.0, 2), SR).unwrap();
    assert_eq!(bpm, 120.0);
}

#[test]
fn short_input_has_no_onsets() {
    let est = OnsetBpmEstimator::new(BpmConfig::default());
    assert!(est.detect_onsets(&[0.5; 100], SR).is_empty());
}
