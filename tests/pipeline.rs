use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::NaiveDate;
use stem_refinery_core::config::RefineryConfig;
use stem_refinery_core::export::metadata::TrackMetadata;
use stem_refinery_core::io::midi::write_midi;
use stem_refinery_core::pipeline::{labels_template, load_labels, save_labels, Labels, StemLabel};
use stem_refinery_core::types::{MidiInstrument, TempoEvent};
use stem_refinery_core::{
    set_export_progress_callback, BatchProcessor, ExportProgress, MidiData, NoteEvent,
    SliceRequest, StemId, StemOutcome, StemWarning, TimeSignature, Track, TrackInfo,
    VocalRights,
};
use tempfile::{tempdir, TempDir};

fn write_wav(path: &Path, seconds: usize) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..44_100 * seconds {
        let v = (((i as f32) * 0.05).sin() * 8000.0) as i16;
        writer.write_sample(v).unwrap();
        writer.write_sample(v / 2).unwrap();
    }
    writer.finalize().unwrap();
}

fn bass_midi() -> MidiData {
    MidiData {
        tempo_events: vec![TempoEvent {
            time: 0.0,
            bpm: 120.0,
        }],
        time_signature_events: Vec::new(),
        instruments: vec![MidiInstrument {
            name: "Bass".into(),
            program: 33,
            is_drum: false,
            notes: vec![
                NoteEvent::new(36, 100, 0.0, 0.5),
                NoteEvent::new(38, 100, 1.0, 1.5),
                NoteEvent::new(40, 100, 2.5, 2.9),
            ],
        }],
    }
}

/// Bass Line.wav + bass_line.mid, Kick.wav, Lead Vocal.wav, a corrupt
/// broken.wav and a stray text file.
fn source_folder() -> TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_wav(&root.join("Bass Line.wav"), 3);
    write_midi(root.join("bass_line.mid"), &bass_midi()).unwrap();
    write_wav(&root.join("Kick.wav"), 3);
    write_wav(&root.join("Lead Vocal.wav"), 3);
    fs::write(root.join("broken.wav"), b"this is not a wav file").unwrap();
    fs::write(root.join("notes.txt"), b"bpm 120").unwrap();
    dir
}

fn id(root: &Path, name: &str) -> StemId {
    StemId::from_path(&root.join(name))
}

fn label(group: &str, instrument: &str) -> StemLabel {
    StemLabel {
        group: group.into(),
        instrument: instrument.into(),
        layer: "Main".into(),
        force_mono: false,
        midi: None,
        no_midi: false,
        skip: false,
    }
}

fn track_info() -> TrackInfo {
    TrackInfo {
        uid: "GP_00001".into(),
        title: "Night Drive".into(),
        original_folder: "night_drive".into(),
        genre: "house".into(),
        genre_parent: "house".into(),
        genre_sub: String::new(),
        bpm: 120.0,
        key: "Cmin".into(),
        time_signature: TimeSignature::default(),
        energy_level: 3,
        moods: Vec::new(),
        vocal_rights: VocalRights::Exclusive,
        contains_ai: false,
    }
}

fn config(output: &Path) -> RefineryConfig {
    RefineryConfig {
        output_root: output.to_path_buf(),
        ..RefineryConfig::default()
    }
}

#[test]
fn scan_pairs_and_flags_vocals() {
    let src = source_folder();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));

    let report = processor.pair_folder(src.path()).unwrap();
    let names: Vec<&str> = report.pairs.iter().map(|p| p.audio.filename()).collect();
    assert_eq!(
        names,
        vec!["Bass Line.wav", "Kick.wav", "Lead Vocal.wav", "broken.wav"]
    );
    assert_eq!(report.with_midi(), 1);
    assert_eq!(
        report.pairs[0].midi.as_ref().map(|m| m.filename()),
        Some("bass_line.mid")
    );
    assert_eq!(report.vocal_indices(), vec![2]);
    assert!(report.excluded.is_empty());
}

#[test]
fn royalty_free_config_drops_vocals() {
    let src = source_folder();
    let out = tempdir().unwrap();
    let cfg = RefineryConfig {
        vocal_rights: VocalRights::RoyaltyFree,
        ..config(out.path())
    };

    let report = BatchProcessor::new(cfg).pair_folder(src.path()).unwrap();
    assert_eq!(report.pairs.len(), 3);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].filename(), "Lead Vocal.wav");
}

#[test]
fn missing_source_folder_is_an_error() {
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));
    assert!(processor.pair_folder(&out.path().join("nope")).is_err());
}

#[test]
fn track_tempo_comes_from_paired_midi() {
    let src = source_folder();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));
    let report = processor.pair_folder(src.path()).unwrap();
    assert_eq!(processor.detect_track_bpm(&report), 120.0);
}

#[test]
fn corrupt_paired_midi_does_not_stop_the_track() {
    let src = tempdir().unwrap();
    write_wav(&src.path().join("bass.wav"), 3);
    write_wav(&src.path().join("kick.wav"), 3);
    fs::write(src.path().join("bass.mid"), b"not a midi file").unwrap();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));

    let report = processor.pair_folder(src.path()).unwrap();
    assert_eq!(report.with_midi(), 1);
    let bpm = processor.detect_track_bpm(&report);
    assert!((60.0..=180.0).contains(&bpm), "bpm {bpm}");

    let mut labels = Labels::new();
    labels.insert(id(src.path(), "bass.wav"), label("Bass", "Sub"));
    labels.insert(id(src.path(), "kick.wav"), label("Drums", "Kick"));
    let (track, _) = Track::from_labels(TrackInfo { bpm, ..track_info() }, &report, &labels);

    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let result = processor
        .process_track(&track, &SliceRequest::bars(0.0, 1.0), date)
        .unwrap();
    assert!(matches!(result.outcomes[0], StemOutcome::Failed { .. }));
    assert!(result.outcomes[1].is_exported());
    assert_eq!(result.summary.audio, 1);
}

#[test]
fn tempo_falls_back_when_nothing_is_readable() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("broken.wav"), b"garbage").unwrap();
    fs::write(src.path().join("broken.mid"), b"garbage").unwrap();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));

    let report = processor.pair_folder(src.path()).unwrap();
    assert_eq!(processor.detect_track_bpm(&report), 120.0);
}

#[test]
fn labels_decide_what_gets_exported() {
    let src = source_folder();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));
    let report = processor.pair_folder(src.path()).unwrap();

    let mut labels = Labels::new();
    labels.insert(id(src.path(), "Kick.wav"), StemLabel {
        midi: Some(src.path().join("bass_line.mid")),
        ..label("Drums", "Kick")
    });
    labels.insert(id(src.path(), "Bass Line.wav"), StemLabel {
        no_midi: true,
        ..label("Bass", "Sub")
    });
    labels.insert(id(src.path(), "broken.wav"), StemLabel {
        skip: true,
        ..label("FX", "Riser")
    });

    let (track, skipped) = Track::from_labels(track_info(), &report, &labels);
    assert_eq!(track.stems.len(), 2);
    assert!(track.stems[0].pair.midi.is_none());
    assert_eq!(
        track.stems[1].pair.midi.as_ref().map(|m| m.filename()),
        Some("bass_line.mid")
    );

    let skipped_ids: Vec<&StemId> = skipped.iter().map(StemOutcome::stem).collect();
    assert_eq!(
        skipped_ids,
        vec![
            &id(src.path(), "Lead Vocal.wav"),
            &id(src.path(), "broken.wav")
        ]
    );
    assert!(skipped.iter().all(|o| !o.is_exported()));
}

#[test]
fn labels_file_round_trips_with_defaults() {
    let src = source_folder();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));
    let report = processor.pair_folder(src.path()).unwrap();

    let template = labels_template(&report);
    assert_eq!(template.len(), 4);
    assert!(template.values().all(|l| l.layer == "Main" && l.group.is_empty()));

    let path = out.path().join("labels.json");
    save_labels(&path, &template).unwrap();
    assert_eq!(load_labels(&path).unwrap(), template);

    let kick = id(src.path(), "Kick.wav");
    let raw = serde_json::json!({
        kick.as_str(): { "group": "drums", "instrument": "kick", "layer": "one_shot" }
    });
    fs::write(&path, raw.to_string()).unwrap();
    let loaded = load_labels(&path).unwrap();
    let entry = &loaded[&kick];
    assert!(!entry.force_mono && !entry.skip && !entry.no_midi);
    assert!(entry.midi.is_none());
    let class = entry.classification();
    assert_eq!(
        (class.group.as_str(), class.instrument.as_str(), class.layer.as_str()),
        ("Drums", "Kick", "One_Shot")
    );
}

#[test]
fn end_to_end_export_survives_a_corrupt_stem() {
    let src = source_folder();
    let out = tempdir().unwrap();
    let processor = BatchProcessor::new(config(out.path()));
    let report = processor.pair_folder(src.path()).unwrap();

    let mut labels = Labels::new();
    labels.insert(id(src.path(), "Bass Line.wav"), label("Bass", "Sub"));
    labels.insert(id(src.path(), "Kick.wav"), label("Drums", "Kick"));
    labels.insert(id(src.path(), "broken.wav"), label("FX", "Riser"));

    let (mut track, skipped) = Track::from_labels(track_info(), &report, &labels);
    assert_eq!(skipped.len(), 1);
    let master = src.path().join("Night Drive.wav");
    write_wav(&master, 1);
    track.masters = vec![master];

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    set_export_progress_callback(move |p| sink.lock().unwrap().push(p));

    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let result = processor
        .process_track(&track, &SliceRequest::bars(0.0, 1.0), date)
        .unwrap();

    assert_eq!(result.uid, "GP_00001");
    assert_eq!(result.exported(), 2);
    assert_eq!(result.failed(), 1);
    assert!(matches!(result.outcomes[2], StemOutcome::Failed { .. }));
    assert_eq!(result.outcomes[2].stem(), &id(src.path(), "broken.wav"));

    match &result.outcomes[0] {
        StemOutcome::Exported {
            audio_path,
            midi_path,
            warnings,
            ..
        } => {
            assert_eq!(
                audio_path.file_name().unwrap().to_string_lossy(),
                "GP_00001_bass_sub_main.wav"
            );
            assert!(midi_path.is_some());
            assert_eq!(
                warnings,
                &vec![StemWarning::ShouldBeMono {
                    instrument: "Sub".into()
                }]
            );
            let wav = hound::WavReader::open(audio_path).unwrap();
            assert_eq!(wav.spec().channels, 1);
            assert_eq!(wav.duration(), 88_200);
        }
        other => panic!("bass should export, got {other:?}"),
    }

    assert_eq!(
        result.track_dir,
        out.path()
            .join("Batch_2024-01-02")
            .join("GP_00001_house_120_Cmin")
    );
    assert_eq!(result.summary.audio, 2);
    assert_eq!(result.summary.midi, 1);
    assert_eq!(result.summary.metadata, 1);
    assert_eq!(result.summary.masters, 1);
    assert!(result.metadata_issues.is_empty());

    let meta = TrackMetadata::read(&result.metadata_path).unwrap();
    assert_eq!(meta.stems_manifest.len(), 2);
    assert_eq!(meta.file_count.midi, 1);

    let sliced_midi =
        stem_refinery_core::read_midi(result.track_dir.join("MIDI/GP_00001_midi_bass_sub.mid"))
            .unwrap();
    assert_eq!(sliced_midi.note_count(), 2);

    let events = events.lock().unwrap();
    assert!(events.contains(&ExportProgress::Stem {
        done: 3,
        total: 3,
        name: "broken.wav".into()
    }));
    assert_eq!(events.last(), Some(&ExportProgress::Finished));
}
