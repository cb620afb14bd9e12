//! MIDI file I/O on top of `midly`.
//!
//! Parsing converts every tick position to seconds using the file's full tempo
//! map, so downstream code never has to think in ticks. Writing is the
//! opposite: a single tempo at PPQ 480, which is all a sliced stem carries.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fs,
    path::Path,
};

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};
use tracing::debug;

use crate::{
    core::tempo::DEFAULT_TEMPO,
    error::{RefineryError, Result},
    types::{MidiData, MidiInstrument, NoteEvent, TempoEvent, TimeSignatureEvent},
};

pub const OUTPUT_PPQ: u16 = 480;

const DRUM_CHANNEL: u8 = 9;
const DEFAULT_US_PER_BEAT: u32 = 500_000;

// Piecewise-linear tick -> seconds mapping.
struct TickClock {
    // (tick, seconds at tick, seconds per tick from here on)
    segments: Vec<(u64, f64, f64)>,
}

impl TickClock {
    fn metrical(ppq: u16, tempo_changes: &[(u64, u32)]) -> Self {
        let ppq = ppq.max(1) as f64;
        let spt = |us: u32| us as f64 / 1_000_000.0 / ppq;
        let mut clock = TickClock {
            segments: vec![(0, 0.0, spt(DEFAULT_US_PER_BEAT))],
        };
        for &(tick, us) in tempo_changes {
            let at = clock.seconds(tick);
            match clock.segments.last_mut() {
                Some(last) if last.0 == tick => last.2 = spt(us),
                _ => clock.segments.push((tick, at, spt(us))),
            }
        }
        clock
    }

    fn timecode(frames_per_second: f32, ticks_per_frame: u8) -> Self {
        let ticks_per_second = frames_per_second as f64 * ticks_per_frame.max(1) as f64;
        TickClock {
            segments: vec![(0, 0.0, 1.0 / ticks_per_second)],
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        let idx = self.segments.partition_point(|s| s.0 <= tick).saturating_sub(1);
        let (start, at, spt) = self.segments[idx];
        at + (tick - start) as f64 * spt
    }
}

#[derive(Default)]
struct InstrumentBuilder {
    name: Option<String>,
    program: Option<u8>,
    notes: Vec<NoteEvent>,
    // key -> queued (start tick, velocity); note-offs close the oldest
    open: HashMap<u8, VecDeque<(u64, u8)>>,
}

/// Decode a Standard MIDI File.
///
/// Each (track, channel) combination with at least one note becomes an
/// instrument; channel 10 is treated as drums.
pub fn parse_midi(bytes: &[u8]) -> Result<MidiData> {
    let smf = Smf::parse(bytes)?;

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut time_signatures: Vec<(u64, u8, u8)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => {
                    tempo_changes.push((tick, us.as_int()));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow, _, _)) => {
                    let den = 1u8.checked_shl(den_pow as u32).unwrap_or(4);
                    time_signatures.push((tick, num, den));
                }
                _ => {}
            }
        }
    }
    tempo_changes.sort_by_key(|t| t.0);
    time_signatures.sort_by_key(|t| t.0);

    let clock = match smf.header.timing {
        Timing::Metrical(ppq) => TickClock::metrical(ppq.as_int(), &tempo_changes),
        Timing::Timecode(fps, ticks_per_frame) => TickClock::timecode(fps.as_f32(), ticks_per_frame),
    };

    let mut builders: BTreeMap<(usize, u8), InstrumentBuilder> = BTreeMap::new();
    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick = 0u64;
        let mut track_name: Option<String> = None;

        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    let name = String::from_utf8_lossy(name).trim().to_string();
                    if !name.is_empty() {
                        track_name = Some(name);
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    let b = builders.entry((track_idx, channel)).or_default();
                    if b.name.is_none() {
                        b.name = track_name.clone();
                    }
                    match message {
                        MidiMessage::ProgramChange { program } => {
                            b.program.get_or_insert(program.as_int());
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            b.open
                                .entry(key.as_int())
                                .or_default()
                                .push_back((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some((start_tick, vel)) =
                                b.open.get_mut(&key).and_then(VecDeque::pop_front)
                            {
                                let start = clock.seconds(start_tick);
                                let end = clock.seconds(tick);
                                if end > start {
                                    b.notes.push(NoteEvent::new(key, vel, start, end));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    let instruments: Vec<MidiInstrument> = builders
        .into_iter()
        .filter(|(_, b)| !b.notes.is_empty())
        .enumerate()
        .map(|(n, ((_, channel), mut b))| {
            b.notes
                .sort_by(|x, y| x.start.total_cmp(&y.start).then(x.pitch.cmp(&y.pitch)));
            MidiInstrument {
                name: b.name.unwrap_or_else(|| format!("Instrument {}", n + 1)),
                program: b.program.unwrap_or(0),
                is_drum: channel == DRUM_CHANNEL,
                notes: b.notes,
            }
        })
        .collect();

    let data = MidiData {
        tempo_events: tempo_changes
            .iter()
            .map(|&(tick, us)| TempoEvent {
                time: clock.seconds(tick),
                bpm: 60_000_000.0 / us.max(1) as f64,
            })
            .collect(),
        time_signature_events: time_signatures
            .iter()
            .map(|&(tick, numerator, denominator)| TimeSignatureEvent {
                time: clock.seconds(tick),
                numerator,
                denominator,
            })
            .collect(),
        instruments,
    };

    debug!(
        instruments = data.instruments.len(),
        notes = data.note_count(),
        tempo_events = data.tempo_events.len(),
        "parsed MIDI"
    );
    Ok(data)
}

pub fn read_midi<P: AsRef<Path>>(path: P) -> Result<MidiData> {
    let bytes = fs::read(path.as_ref())?;
    parse_midi(&bytes)
}

/// Encode as a format-1 file: a conductor track with tempo and meter, then one
/// track per instrument.
pub fn encode_midi(data: &MidiData) -> Result<Vec<u8>> {
    let bpm = data
        .tempo_events
        .first()
        .map(|t| t.bpm)
        .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
        .unwrap_or(DEFAULT_TEMPO);
    let ticks_per_second = OUTPUT_PPQ as f64 * bpm / 60.0;
    let to_tick = |secs: f64| (secs.max(0.0) * ticks_per_second).round() as u32;

    let mut tracks: Vec<Track> = Vec::with_capacity(data.instruments.len() + 1);

    let mut meta: Vec<(u32, TrackEventKind)> = vec![(
        0,
        TrackEventKind::Meta(MetaMessage::Tempo(((60_000_000.0 / bpm).round() as u32).into())),
    )];
    for ts in &data.time_signature_events {
        if !ts.denominator.is_power_of_two() {
            return Err(RefineryError::Midi(format!(
                "time signature denominator {} is not a power of two",
                ts.denominator
            )));
        }
        meta.push((
            to_tick(ts.time),
            TrackEventKind::Meta(MetaMessage::TimeSignature(
                ts.numerator,
                ts.denominator.trailing_zeros() as u8,
                24,
                8,
            )),
        ));
    }
    tracks.push(into_track(meta));

    let mut next_channel = 0u8;
    for inst in &data.instruments {
        let channel = if inst.is_drum {
            DRUM_CHANNEL
        } else {
            let c = next_channel;
            next_channel = (next_channel + 1) % 16;
            if next_channel == DRUM_CHANNEL {
                next_channel += 1;
            }
            c
        };

        let mut events: Vec<(u32, TrackEventKind)> = vec![
            (0, TrackEventKind::Meta(MetaMessage::TrackName(inst.name.as_bytes()))),
            (
                0,
                TrackEventKind::Midi {
                    channel: channel.into(),
                    message: MidiMessage::ProgramChange {
                        program: inst.program.min(127).into(),
                    },
                },
            ),
        ];
        for note in &inst.notes {
            let key = note.pitch.min(127);
            let on = to_tick(note.start);
            // A note shorter than a tick still needs its off after its on.
            let off = to_tick(note.end).max(on.saturating_add(1));
            events.push((
                on,
                TrackEventKind::Midi {
                    channel: channel.into(),
                    message: MidiMessage::NoteOn {
                        key: key.into(),
                        vel: note.velocity.clamp(1, 127).into(),
                    },
                },
            ));
            events.push((
                off,
                TrackEventKind::Midi {
                    channel: channel.into(),
                    message: MidiMessage::NoteOff {
                        key: key.into(),
                        vel: 0u8.into(),
                    },
                },
            ));
        }
        tracks.push(into_track(events));
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(OUTPUT_PPQ.into()),
        },
        tracks,
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| RefineryError::Midi(format!("failed to write MIDI: {e}")))?;
    Ok(bytes)
}

pub fn write_midi<P: AsRef<Path>>(path: P, data: &MidiData) -> Result<()> {
    let bytes = encode_midi(data)?;
    fs::write(path.as_ref(), bytes)?;
    Ok(())
}

// Absolute ticks -> delta-timed track. Note-offs sort before note-ons on the
// same tick so back-to-back notes of one key don't swallow each other.
fn into_track(mut events: Vec<(u32, TrackEventKind)>) -> Track {
    events.sort_by_key(|(tick, kind)| {
        let order = match kind {
            TrackEventKind::Meta(_) => 0,
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { .. },
                ..
            } => 1,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { .. },
                ..
            } => 2,
            _ => 3,
        };
        (*tick, order)
    });

    let mut track = Track::new();
    let mut last_tick = 0u32;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: 0u32.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_follows_tempo_changes() {
        // 120 BPM for one beat, then 60 BPM
        let clock = TickClock::metrical(480, &[(0, 500_000), (480, 1_000_000)]);
        assert!((clock.seconds(480) - 0.5).abs() < 1e-9);
        assert!((clock.seconds(960) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn clock_defaults_to_120_bpm() {
        let clock = TickClock::metrical(96, &[]);
        assert!((clock.seconds(96) - 0.5).abs() < 1e-9);
    }
}
