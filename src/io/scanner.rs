use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    error::{RefineryError, Result},
    types::{AudioAsset, MidiAsset},
};

pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "wave"];
pub const MIDI_EXTENSIONS: &[&str] = &["mid", "midi"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Audio,
    Midi,
}

/// Case-insensitive extension check; `None` for anything we don't ingest.
pub fn classify(path: &Path) -> Option<AssetKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Audio)
    } else if MIDI_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Midi)
    } else {
        None
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanResult {
    pub audio: Vec<AudioAsset>,
    pub midi: Vec<MidiAsset>,
}

/// Recursively collect audio and MIDI files under `root`, sorted by path.
pub fn scan_folder(root: &Path) -> Result<ScanResult> {
    if !root.is_dir() {
        return Err(RefineryError::ScanRoot(root.to_path_buf()));
    }

    let mut result = ScanResult::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match classify(entry.path()) {
            Some(AssetKind::Audio) => result.audio.push(AudioAsset::new(entry.path())),
            Some(AssetKind::Midi) => result.midi.push(MidiAsset::new(entry.path())),
            None => {}
        }
    }

    debug!(
        root = %root.display(),
        audio = result.audio.len(),
        midi = result.midi.len(),
        "scan complete"
    );
    Ok(result)
}
