// Tempo estimation for stems that arrive without MIDI.
// Energy-flux onsets, then a folded inter-onset-interval histogram.

use anyhow::anyhow;

use crate::{core::tempo::DEFAULT_TEMPO, error::Result};

/// Anything that can turn a mono signal into a BPM figure.
pub trait BpmEstimator {
    fn estimate(&self, mono: &[f32], sample_rate: u32) -> Result<f64>;
}

#[derive(Debug, Clone)]
pub struct BpmConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Onset threshold = mean(flux) + threshold_factor * std(flux)
    pub threshold_factor: f64,
    pub min_onset_gap_secs: f64,
    /// Below this many onsets the estimator falls back to 120 BPM.
    pub min_onsets: usize,
    /// IOIs within this many BPM of the histogram peak are averaged for the final value.
    pub refine_band_bpm: f64,
}

impl Default for BpmConfig {
    fn default() -> Self {
        BpmConfig {
            frame_size: 1024,
            hop_size: 512,
            min_bpm: 60.0,
            max_bpm: 180.0,
            threshold_factor: 1.5,
            min_onset_gap_secs: 0.1,
            min_onsets: 4,
            refine_band_bpm: 4.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OnsetBpmEstimator {
    config: BpmConfig,
}

impl OnsetBpmEstimator {
    pub fn new(config: BpmConfig) -> Self {
        Self { config }
    }

    /// Onset times in seconds.
    pub fn detect_onsets(&self, mono: &[f32], sample_rate: u32) -> Vec<f64> {
        let cfg = &self.config;
        if mono.len() < cfg.frame_size || cfg.hop_size == 0 || sample_rate == 0 {
            return Vec::new();
        }

        let energies: Vec<f64> = (0..=(mono.len() - cfg.frame_size) / cfg.hop_size)
            .map(|i| {
                let frame = &mono[i * cfg.hop_size..i * cfg.hop_size + cfg.frame_size];
                let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
                (sum / cfg.frame_size as f64).sqrt()
            })
            .collect();

        // Half-wave rectified energy difference
        let mut flux = vec![0.0f64; energies.len()];
        for i in 1..energies.len() {
            flux[i] = (energies[i] - energies[i - 1]).max(0.0);
        }

        let n = flux.len() as f64;
        let mean = flux.iter().sum::<f64>() / n;
        let var = flux.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;
        let threshold = mean + cfg.threshold_factor * var.sqrt();

        let hop_secs = cfg.hop_size as f64 / sample_rate as f64;
        let mut onsets: Vec<f64> = Vec::new();
        for i in 1..flux.len() {
            let next = flux.get(i + 1).copied().unwrap_or(0.0);
            let is_peak = flux[i] > flux[i - 1] && flux[i] >= next;
            if !is_peak || flux[i] <= threshold {
                continue;
            }
            let t = i as f64 * hop_secs;
            if onsets
                .last()
                .map_or(true, |&last| t - last >= cfg.min_onset_gap_secs)
            {
                onsets.push(t);
            }
        }

        onsets
    }

    // Octave-fold a BPM value into [min_bpm, max_bpm].
    fn fold(&self, mut bpm: f64) -> Option<f64> {
        let cfg = &self.config;
        if !bpm.is_finite() || bpm <= 0.0 {
            return None;
        }
        while bpm < cfg.min_bpm {
            bpm *= 2.0;
        }
        while bpm > cfg.max_bpm {
            bpm /= 2.0;
        }
        (bpm >= cfg.min_bpm).then_some(bpm)
    }
}

impl BpmEstimator for OnsetBpmEstimator {
    fn estimate(&self, mono: &[f32], sample_rate: u32) -> Result<f64> {
        if sample_rate == 0 {
            return Err(anyhow!("cannot estimate tempo at a sample rate of 0").into());
        }
        let cfg = &self.config;

        let onsets = self.detect_onsets(mono, sample_rate);
        if onsets.len() < cfg.min_onsets {
            return Ok(DEFAULT_TEMPO);
        }

        let candidates: Vec<f64> = onsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|ioi| *ioi > 0.0)
            .filter_map(|ioi| self.fold(60.0 / ioi))
            .collect();
        if candidates.is_empty() {
            return Ok(DEFAULT_TEMPO);
        }

        // One bin per BPM
        let bins = (cfg.max_bpm - cfg.min_bpm).round() as usize + 1;
        let mut histogram = vec![0usize; bins];
        for bpm in &candidates {
            let bin = ((bpm - cfg.min_bpm).round() as usize).min(bins - 1);
            histogram[bin] += 1;
        }

        let mut peak_bin = 0;
        for (i, &count) in histogram.iter().enumerate() {
            if count > histogram[peak_bin] {
                peak_bin = i;
            }
        }
        let peak_bpm = cfg.min_bpm + peak_bin as f64;

        let near: Vec<f64> = candidates
            .iter()
            .filter(|bpm| (*bpm - peak_bpm).abs() <= cfg.refine_band_bpm)
            .map(|bpm| 60.0 / bpm)
            .collect();
        if near.is_empty() {
            return Ok(peak_bpm);
        }
        let mean_interval = near.iter().sum::<f64>() / near.len() as f64;

        Ok(60.0 / mean_interval)
    }
}
