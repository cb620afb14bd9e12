//! One track's trip into the dataset staging tree.
//!
//! ```text
//! NotStarted -> BatchStarted -> TrackStarted -> StemExported(n)* -> Finalized
//! ```
//!
//! `start_track` from `NotStarted` opens today's batch first. `Finalized` is
//! terminal; a new track needs a new session. Exporting the same
//! group/instrument/layer twice overwrites the earlier files without warning.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    config::RefineryConfig,
    core::validator::{StemValidator, StemWarning},
    error::{RefineryError, Result},
    export::{
        metadata::{StemManifestEntry, TrackMetadata},
        naming::{audio_filename, batch_dir_name, metadata_filename, midi_filename, track_dir_name},
    },
    io::{audio::write_audio, midi::write_midi},
    types::{AudioBuffer, MidiData, StemClassification, TrackInfo},
};

pub const AUDIO_DIR: &str = "Audio";
pub const MIDI_DIR: &str = "MIDI";
pub const METADATA_DIR: &str = "Metadata";
pub const MASTERS_DIR: &str = "Masters";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    BatchStarted,
    TrackStarted,
    StemExported(usize),
    Finalized,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not started",
            SessionState::BatchStarted => "batch started",
            SessionState::TrackStarted => "track started",
            SessionState::StemExported(_) => "exporting stems",
            SessionState::Finalized => "finalized",
        }
    }

    fn track_open(&self) -> bool {
        matches!(self, SessionState::TrackStarted | SessionState::StemExported(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportedStem {
    pub audio_path: PathBuf,
    pub midi_path: Option<PathBuf>,
    pub entry: StemManifestEntry,
}

/// File counts per track sub-directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub audio: usize,
    pub midi: usize,
    pub metadata: usize,
    pub masters: usize,
}

#[derive(Clone, Debug)]
pub struct FinalizedTrack {
    pub metadata: TrackMetadata,
    pub metadata_path: PathBuf,
    pub summary: ExportSummary,
}

struct OpenTrack {
    info: TrackInfo,
    dir: PathBuf,
    stems: Vec<StemManifestEntry>,
}

pub struct ExportSession {
    output_root: PathBuf,
    batch_prefix: String,
    app_version: String,
    validator: StemValidator,
    state: SessionState,
    batch_dir: Option<PathBuf>,
    track: Option<OpenTrack>,
}

impl ExportSession {
    pub fn new(output_root: impl Into<PathBuf>, validator: StemValidator) -> Self {
        let defaults = RefineryConfig::default();
        Self {
            output_root: output_root.into(),
            batch_prefix: defaults.batch_prefix,
            app_version: defaults.app_version,
            validator,
            state: SessionState::NotStarted,
            batch_dir: None,
            track: None,
        }
    }

    pub fn from_config(config: &RefineryConfig) -> Self {
        Self {
            output_root: config.output_root.clone(),
            batch_prefix: config.batch_prefix.clone(),
            app_version: config.app_version.clone(),
            validator: StemValidator::new(config.taxonomy.clone()),
            state: SessionState::NotStarted,
            batch_dir: None,
            track: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn batch_dir(&self) -> Option<&Path> {
        self.batch_dir.as_deref()
    }

    pub fn track_dir(&self) -> Option<&Path> {
        self.track.as_ref().map(|t| t.dir.as_path())
    }

    fn state_error(&self, action: &'static str) -> RefineryError {
        RefineryError::SessionState {
            state: self.state.name(),
            action,
        }
    }

    /// Create `{output_root}/{prefix}_{date}`.
    pub fn start_batch(&mut self, date: NaiveDate) -> Result<PathBuf> {
        if !matches!(self.state, SessionState::NotStarted | SessionState::BatchStarted) {
            return Err(self.state_error("start a batch"));
        }
        let dir = self.output_root.join(batch_dir_name(&self.batch_prefix, date));
        fs::create_dir_all(&dir)?;
        info!(batch = %dir.display(), "batch directory ready");

        self.batch_dir = Some(dir.clone());
        self.state = SessionState::BatchStarted;
        Ok(dir)
    }

    /// Create the track directory and its sub-directories.
    pub fn start_track(&mut self, info: &TrackInfo) -> Result<PathBuf> {
        if info.uid.trim().is_empty() {
            return Err(RefineryError::MissingSessionInput("uid"));
        }
        if info.title.trim().is_empty() {
            return Err(RefineryError::MissingSessionInput("title"));
        }
        if self.state == SessionState::NotStarted {
            self.start_batch(Local::now().date_naive())?;
        }
        if self.state != SessionState::BatchStarted {
            return Err(self.state_error("start a track"));
        }

        let batch = self
            .batch_dir
            .clone()
            .ok_or_else(|| self.state_error("start a track"))?;
        let dir = batch.join(track_dir_name(&info.uid, &info.genre, info.bpm, &info.key));
        for sub in [AUDIO_DIR, MIDI_DIR, METADATA_DIR, MASTERS_DIR] {
            fs::create_dir_all(dir.join(sub))?;
        }
        info!(track = %dir.display(), "track directory ready");

        self.track = Some(OpenTrack {
            info: info.clone(),
            dir: dir.clone(),
            stems: Vec::new(),
        });
        self.state = SessionState::TrackStarted;
        Ok(dir)
    }

    /// Write one stem's audio (and MIDI, when present) under the open track.
    ///
    /// The audio is mixed down to mono first if the label or the taxonomy asks
    /// for it.
    pub fn export_stem(
        &mut self,
        class: &StemClassification,
        audio: &AudioBuffer,
        midi: Option<&MidiData>,
        original_filename: &str,
        warnings: &[StemWarning],
    ) -> Result<ExportedStem> {
        if !self.state.track_open() {
            return Err(self.state_error("export a stem"));
        }
        let wants_mono = self.validator.wants_mono(class);
        let track = self
            .track
            .as_mut()
            .ok_or(RefineryError::SessionState {
                state: "track missing",
                action: "export a stem",
            })?;
        let uid = track.info.uid.clone();

        let audio = if wants_mono { audio.to_mono() } else { audio.clone() };
        let audio_name = audio_filename(&uid, &class.group, &class.instrument, &class.layer);
        let audio_path = track.dir.join(AUDIO_DIR).join(&audio_name);
        write_audio(&audio_path, &audio)?;
        debug!(file = %audio_name, "exported audio");

        let midi_path = match midi {
            Some(data) => {
                let name = midi_filename(&uid, &class.group, &class.instrument);
                let path = track.dir.join(MIDI_DIR).join(&name);
                write_midi(&path, data)?;
                debug!(file = %name, "exported MIDI");
                Some(path)
            }
            None => None,
        };

        let entry = StemManifestEntry {
            group: class.group.clone(),
            instrument: class.instrument.clone(),
            layer: class.layer.clone(),
            is_mono: audio.is_mono(),
            original_filename: original_filename.to_string(),
            audio_file: audio_name,
            midi_file: midi_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            warnings: warnings.iter().map(ToString::to_string).collect(),
        };

        match track.stems.iter_mut().find(|e| e.same_slot(&entry)) {
            Some(existing) => *existing = entry.clone(),
            None => track.stems.push(entry.clone()),
        }
        let count = track.stems.len();
        self.state = SessionState::StemExported(count);

        Ok(ExportedStem {
            audio_path,
            midi_path,
            entry,
        })
    }

    /// Copy master/mixdown files into `Masters/`. Missing sources are skipped.
    pub fn copy_masters(&mut self, sources: &[PathBuf]) -> Result<usize> {
        if !self.state.track_open() {
            return Err(self.state_error("copy masters"));
        }
        let dir = match &self.track {
            Some(t) => t.dir.join(MASTERS_DIR),
            None => return Err(self.state_error("copy masters")),
        };

        let mut copied = 0;
        for src in sources.iter().filter(|p| p.is_file()) {
            if let Some(name) = src.file_name() {
                fs::copy(src, dir.join(name))?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Write `{uid}_info.json` and close the session.
    pub fn finalize(&mut self, date_processed: NaiveDate) -> Result<FinalizedTrack> {
        if !self.state.track_open() {
            return Err(self.state_error("finalize"));
        }
        let track = match self.track.take() {
            Some(t) => t,
            None => return Err(self.state_error("finalize")),
        };

        let metadata = TrackMetadata::new(&track.info, track.stems, date_processed, &self.app_version);
        let metadata_path = track
            .dir
            .join(METADATA_DIR)
            .join(metadata_filename(&track.info.uid));
        metadata.write(&metadata_path)?;

        let summary = export_summary(&track.dir)?;
        info!(
            uid = %metadata.uid,
            audio = summary.audio,
            midi = summary.midi,
            metadata = summary.metadata,
            masters = summary.masters,
            "track export complete"
        );

        self.state = SessionState::Finalized;
        Ok(FinalizedTrack {
            metadata,
            metadata_path,
            summary,
        })
    }
}

fn count_files(dir: &Path, ext: Option<&str>) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut n = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = match ext {
            Some(ext) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            None => true,
        };
        if matches {
            n += 1;
        }
    }
    Ok(n)
}

pub fn export_summary(track_dir: &Path) -> Result<ExportSummary> {
    Ok(ExportSummary {
        audio: count_files(&track_dir.join(AUDIO_DIR), Some("wav"))?,
        midi: count_files(&track_dir.join(MIDI_DIR), Some("mid"))?,
        metadata: count_files(&track_dir.join(METADATA_DIR), Some("json"))?,
        masters: count_files(&track_dir.join(MASTERS_DIR), None)?,
    })
}
