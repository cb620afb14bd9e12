//! # stem-refinery-core
//!
//! Turns a producer's folder of raw audio stems and MIDI files into a labelled,
//! bar-aligned dataset: filenames are fuzzily paired, audio and MIDI are cut
//! to the same window, labels are checked against a taxonomy, and everything
//! is written out under a fixed naming scheme with JSON metadata.

pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod io;
pub mod pipeline;
pub mod types;

pub use crate::{
    config::{RefineryConfig, Taxonomy},
    core::{
        bpm::{BpmEstimator, OnsetBpmEstimator},
        pairing::{auto_pair, normalize, similarity, Pairer, PairingReport, VocalPolicy},
        slicer::{slice_audio, slice_midi, slice_notes, AlignedSlicer, SliceRequest, SlicedStem},
        tempo::{bars_to_seconds, TimeWindow},
        validator::{StemValidator, StemWarning},
    },
    error::{RefineryError, Result},
    export::{
        session::ExportSession,
        uid::{FixedUidSequence, ScanningUidSequence, UidSequence},
    },
    io::{
        audio::{read_audio, write_audio},
        midi::{read_midi, write_midi},
        progress::{set_export_progress_callback, ExportProgress},
        scanner::scan_folder,
    },
    pipeline::{BatchProcessor, StemOutcome, Track},
    types::{
        AudioAsset, AudioBuffer, MidiAsset, MidiData, NoteEvent, StemClassification, StemId,
        StemPair, TimeSignature, TrackInfo, VocalRights,
    },
};
