//! Folder-to-dataset driver: scan, pair, label, slice, validate, export.
//!
//! Every stem yields a [`StemOutcome`]. A stem that fails to load or write is
//! logged and reported; the rest of the track still goes out.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    config::RefineryConfig,
    core::{
        bpm::{BpmEstimator, OnsetBpmEstimator},
        pairing::{Pairer, PairingReport, VocalDetector},
        slicer::{AlignedSlicer, SliceRequest},
        tempo::{midi_tempo, DEFAULT_TEMPO},
        validator::{StemValidator, StemWarning},
    },
    error::{RefineryError, Result},
    export::{
        metadata::{validate_metadata, MetadataIssue},
        session::{ExportSession, ExportSummary},
    },
    io::{
        audio::read_audio,
        midi::read_midi,
        progress::{emit_export_progress, ExportProgress},
        scanner::scan_folder,
    },
    types::{MidiAsset, StemClassification, StemId, StemPair, TrackInfo},
};

/// One entry of the labels file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StemLabel {
    pub group: String,
    pub instrument: String,
    pub layer: String,
    #[serde(default)]
    pub force_mono: bool,
    /// Manual MIDI choice, replacing the automatic match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi: Option<PathBuf>,
    /// Drop the automatic MIDI match without choosing another.
    #[serde(default)]
    pub no_midi: bool,
    /// Leave this stem out of the export.
    #[serde(default)]
    pub skip: bool,
}

impl StemLabel {
    pub fn classification(&self) -> StemClassification {
        let class = StemClassification::new(&self.group, &self.instrument, &self.layer);
        if self.force_mono {
            class.forcing_mono()
        } else {
            class
        }
    }

    fn apply_midi_override(&self, pair: StemPair) -> StemPair {
        if self.no_midi {
            pair.with_midi_override(None)
        } else if let Some(path) = &self.midi {
            pair.with_midi_override(Some(MidiAsset::new(path)))
        } else {
            pair
        }
    }
}

/// Labels keyed by [`StemId`], as stored in the labels JSON file.
pub type Labels = BTreeMap<StemId, StemLabel>;

pub fn load_labels(path: &Path) -> Result<Labels> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_labels(path: &Path, labels: &Labels) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(labels)?)?;
    Ok(())
}

/// A blank label per pair, for a human to fill in.
pub fn labels_template(report: &PairingReport) -> Labels {
    report
        .pairs
        .iter()
        .map(|p| {
            (
                p.id.clone(),
                StemLabel {
                    group: String::new(),
                    instrument: String::new(),
                    layer: "Main".into(),
                    force_mono: false,
                    midi: None,
                    no_midi: false,
                    skip: false,
                },
            )
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackStem {
    pub pair: StemPair,
    pub classification: StemClassification,
}

/// The labelled stems of one track, in pairing order.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub info: TrackInfo,
    pub stems: Vec<TrackStem>,
    /// Master/mixdown files copied verbatim into `Masters/`.
    pub masters: Vec<PathBuf>,
}

impl Track {
    /// Attach labels to pairs. Pairs without a label, or marked `skip`, come
    /// back as [`StemOutcome::Skipped`].
    pub fn from_labels(
        info: TrackInfo,
        report: &PairingReport,
        labels: &Labels,
    ) -> (Self, Vec<StemOutcome>) {
        let mut stems = Vec::new();
        let mut skipped = Vec::new();

        for pair in &report.pairs {
            match labels.get(&pair.id) {
                Some(label) if label.skip => skipped.push(StemOutcome::Skipped {
                    stem: pair.id.clone(),
                    reason: "marked skip".into(),
                }),
                Some(label) => stems.push(TrackStem {
                    pair: label.apply_midi_override(pair.clone()),
                    classification: label.classification(),
                }),
                None => {
                    warn!(stem = %pair.id, "no label, skipping");
                    skipped.push(StemOutcome::Skipped {
                        stem: pair.id.clone(),
                        reason: "no label".into(),
                    });
                }
            }
        }

        (
            Self {
                info,
                stems,
                masters: Vec::new(),
            },
            skipped,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StemOutcome {
    Exported {
        stem: StemId,
        audio_path: PathBuf,
        midi_path: Option<PathBuf>,
        warnings: Vec<StemWarning>,
    },
    Failed {
        stem: StemId,
        reason: String,
    },
    Skipped {
        stem: StemId,
        reason: String,
    },
}

impl StemOutcome {
    pub fn stem(&self) -> &StemId {
        match self {
            StemOutcome::Exported { stem, .. }
            | StemOutcome::Failed { stem, .. }
            | StemOutcome::Skipped { stem, .. } => stem,
        }
    }

    pub fn is_exported(&self) -> bool {
        matches!(self, StemOutcome::Exported { .. })
    }
}

#[derive(Clone, Debug)]
pub struct TrackReport {
    pub uid: String,
    pub track_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub outcomes: Vec<StemOutcome>,
    pub metadata_issues: Vec<MetadataIssue>,
    pub summary: ExportSummary,
}

impl TrackReport {
    pub fn exported(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_exported()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, StemOutcome::Failed { .. }))
            .count()
    }
}

pub struct BatchProcessor {
    config: RefineryConfig,
    slicer: AlignedSlicer,
    validator: StemValidator,
    estimator: Box<dyn BpmEstimator>,
}

impl BatchProcessor {
    pub fn new(config: RefineryConfig) -> Self {
        let validator = StemValidator::new(config.taxonomy.clone());
        Self {
            config,
            slicer: AlignedSlicer::default(),
            validator,
            estimator: Box::new(OnsetBpmEstimator::default()),
        }
    }

    pub fn with_slicer(mut self, slicer: AlignedSlicer) -> Self {
        self.slicer = slicer;
        self
    }

    pub fn config(&self) -> &RefineryConfig {
        &self.config
    }

    pub fn validator(&self) -> &StemValidator {
        &self.validator
    }

    /// Scan `root` and pair what was found under the configured vocal policy.
    pub fn pair_folder(&self, root: &Path) -> Result<PairingReport> {
        let scan = scan_folder(root)?;
        let pairer = Pairer::new(
            self.config.match_threshold,
            VocalDetector::new(&self.config.vocal_keywords),
            self.config.effective_vocal_policy(),
        );
        Ok(pairer.pair(&scan.audio, &scan.midi))
    }

    /// Track tempo when none was given: the first readable paired MIDI, else an
    /// estimate from the first audio file that decodes, else the default tempo.
    ///
    /// Unreadable assets are skipped with a warning; they fail later as stems.
    pub fn detect_track_bpm(&self, report: &PairingReport) -> f64 {
        for midi in report.pairs.iter().filter_map(|p| p.midi.as_ref()) {
            match read_midi(midi.path()) {
                Ok(data) => {
                    let bpm = midi_tempo(&data);
                    info!(bpm, file = midi.filename(), "track tempo from MIDI");
                    return bpm;
                }
                Err(e) => {
                    warn!(file = midi.filename(), error = %e, "unreadable MIDI, skipping for tempo")
                }
            }
        }
        for pair in &report.pairs {
            let estimate = read_audio(pair.audio.path())
                .map_err(RefineryError::from)
                .and_then(|audio| self.estimator.estimate(&audio.mono_mix(), audio.sample_rate));
            match estimate {
                Ok(bpm) => {
                    info!(bpm, file = pair.audio.filename(), "track tempo estimated from audio");
                    return bpm;
                }
                Err(e) => {
                    warn!(file = pair.audio.filename(), error = %e, "no tempo from audio, skipping")
                }
            }
        }
        DEFAULT_TEMPO
    }

    /// Export every stem of `track` into one session.
    ///
    /// Errors are returned only when the session itself can't start or finish;
    /// per-stem problems end up in the report.
    pub fn process_track(
        &self,
        track: &Track,
        request: &SliceRequest,
        date: NaiveDate,
    ) -> Result<TrackReport> {
        let mut session = ExportSession::from_config(&self.config);
        session.start_batch(date)?;
        let track_dir = session.start_track(&track.info)?;

        let request = SliceRequest {
            tempo: request.tempo.or((track.info.bpm > 0.0).then_some(track.info.bpm)),
            time_signature: request.time_signature.or(Some(track.info.time_signature)),
            ..*request
        };

        let total = track.stems.len();
        emit_export_progress(ExportProgress::Stage("export_stems"));
        let mut outcomes = Vec::with_capacity(total);
        for (i, stem) in track.stems.iter().enumerate() {
            let outcome = self.process_stem(&mut session, stem, &request);
            emit_export_progress(ExportProgress::Stem {
                done: i + 1,
                total,
                name: stem.pair.audio.filename().to_string(),
            });
            outcomes.push(outcome);
        }

        if !track.masters.is_empty() {
            let copied = session.copy_masters(&track.masters)?;
            info!(copied, "copied master files");
        }

        emit_export_progress(ExportProgress::Stage("finalize"));
        let finalized = session.finalize(date)?;
        let metadata_issues =
            validate_metadata(&finalized.metadata, &self.config.uid_prefix, &self.config.taxonomy);
        for issue in &metadata_issues {
            warn!(uid = %track.info.uid, "metadata: {}", issue);
        }
        emit_export_progress(ExportProgress::Finished);

        Ok(TrackReport {
            uid: track.info.uid.clone(),
            track_dir,
            metadata_path: finalized.metadata_path,
            outcomes,
            metadata_issues,
            summary: finalized.summary,
        })
    }

    /// Slice, validate and export one stem. Never fails the batch.
    pub fn process_stem(
        &self,
        session: &mut ExportSession,
        stem: &TrackStem,
        request: &SliceRequest,
    ) -> StemOutcome {
        let id = stem.pair.id.clone();
        let class = &stem.classification;

        let sliced = match self.slicer.slice_pair(
            stem.pair.audio.path(),
            stem.pair.midi.as_ref().map(MidiAsset::path),
            request,
        ) {
            Ok(s) => s,
            Err(e) => {
                error!(stem = %id, "slicing failed: {}", e);
                return StemOutcome::Failed {
                    stem: id,
                    reason: e.to_string(),
                };
            }
        };

        let warnings = self.validator.validate_classification(
            class,
            sliced.midi.is_some(),
            sliced.audio.is_mono(),
        );
        for w in &warnings {
            warn!(stem = %id, "{}", w);
        }

        match session.export_stem(
            class,
            &sliced.audio,
            sliced.midi.as_ref(),
            stem.pair.audio.filename(),
            &warnings,
        ) {
            Ok(exported) => StemOutcome::Exported {
                stem: id,
                audio_path: exported.audio_path,
                midi_path: exported.midi_path,
                warnings,
            },
            Err(e) => {
                error!(stem = %id, "export failed: {}", e);
                StemOutcome::Failed {
                    stem: id,
                    reason: e.to_string(),
                }
            }
        }
    }
}
