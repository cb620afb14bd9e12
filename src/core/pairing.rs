//! Filename-based audio/MIDI pairing.
//!
//! Matching is greedy and single-pass: audio assets are visited in scan order and
//! each one claims its best remaining MIDI candidate. An earlier audio file can
//! therefore take a MIDI file that would have scored higher for a later one.

use std::{collections::HashSet, fmt, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{AudioAsset, MidiAsset, StemPair, VocalRights};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 70.0;

/// Lowercase, drop the extension, turn `_`/`-` into spaces and collapse whitespace.
///
/// Dots left in the stem become spaces too, otherwise a second pass would strip
/// `.5` from `take 1.5` as if it were an extension.
pub fn normalize(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.to_lowercase()
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_sort(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Longest common subsequence length over chars, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Indel ratio `2 * lcs / (len_a + len_b)` scaled to `[0, 100]`.
///
/// Only insertions and deletions count, so a substitution costs two edits.
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Word-order-insensitive similarity in `[0, 100]`: the indel ratio of the
/// token-sorted strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    indel_ratio(&token_sort(a), &token_sort(b))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidiMatch<'a> {
    pub index: usize,
    pub midi: &'a MidiAsset,
    pub score: f64,
}

/// Best unused candidate for `audio`, if it clears `threshold`.
///
/// Ties go to the candidate seen first.
pub fn find_match<'a>(
    audio: &AudioAsset,
    candidates: &'a [MidiAsset],
    used: &HashSet<usize>,
    threshold: f64,
) -> Option<MidiMatch<'a>> {
    let mut best: Option<MidiMatch<'a>> = None;

    for (index, midi) in candidates.iter().enumerate() {
        if used.contains(&index) {
            continue;
        }
        let score = similarity(audio.normalized_name(), midi.normalized_name());
        if best.map_or(true, |b| score > b.score) {
            best = Some(MidiMatch { index, midi, score });
        }
    }

    best.filter(|m| m.score >= threshold)
}

/// Greedy assignment of MIDI files to audio files; each MIDI file is used at most once.
pub fn auto_pair(audio: &[AudioAsset], midi: &[MidiAsset], threshold: f64) -> Vec<StemPair> {
    let mut used: HashSet<usize> = HashSet::new();
    let mut pairs = Vec::with_capacity(audio.len());

    for asset in audio {
        let pair = match find_match(asset, midi, &used, threshold) {
            Some(m) => {
                debug!(
                    audio = asset.filename(),
                    midi = m.midi.filename(),
                    score = m.score,
                    "paired"
                );
                used.insert(m.index);
                StemPair::new(asset.clone(), Some(m.midi.clone()), m.score)
            }
            None => StemPair::new(asset.clone(), None, 0.0),
        };
        pairs.push(pair);
    }

    pairs
}

/// Substring matcher over normalized names.
#[derive(Clone, Debug)]
pub struct VocalDetector {
    keywords: Vec<String>,
}

impl VocalDetector {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| normalize_keyword(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_vocal(&self, audio: &AudioAsset) -> bool {
        let name = audio.normalized_name();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }
}

// Keywords carry no extension; running them through `normalize` would treat a
// dotted keyword's tail as one.
fn normalize_keyword(keyword: &str) -> String {
    keyword
        .to_lowercase()
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// What to do with audio assets that look like vocals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocalPolicy {
    /// Keep the pair and mark it for manual review.
    Flag,
    /// Drop vocal audio before pairing.
    Exclude,
}

impl VocalPolicy {
    pub fn for_rights(rights: VocalRights) -> Self {
        match rights {
            VocalRights::Exclusive => VocalPolicy::Flag,
            VocalRights::RoyaltyFree => VocalPolicy::Exclude,
        }
    }
}

pub struct Pairer {
    threshold: f64,
    vocals: VocalDetector,
    policy: VocalPolicy,
}

impl Pairer {
    pub fn new(threshold: f64, vocals: VocalDetector, policy: VocalPolicy) -> Self {
        Self {
            threshold,
            vocals,
            policy,
        }
    }

    pub fn pair(&self, audio: &[AudioAsset], midi: &[MidiAsset]) -> PairingReport {
        let mut kept = Vec::with_capacity(audio.len());
        let mut excluded = Vec::new();

        for asset in audio {
            if self.policy == VocalPolicy::Exclude && self.vocals.is_vocal(asset) {
                warn!(file = asset.filename(), "skipping vocal stem (exclude policy)");
                excluded.push(asset.clone());
            } else {
                kept.push(asset.clone());
            }
        }

        let mut pairs = auto_pair(&kept, midi, self.threshold);
        for pair in &mut pairs {
            pair.is_vocal = self.vocals.is_vocal(&pair.audio);
        }

        let report = PairingReport { pairs, excluded };
        info!(
            pairs = report.pairs.len(),
            with_midi = report.with_midi(),
            excluded = report.excluded.len(),
            "pairing complete"
        );
        report
    }
}

#[derive(Clone, Debug, Default)]
pub struct PairingReport {
    pub pairs: Vec<StemPair>,
    /// Vocal assets dropped under [`VocalPolicy::Exclude`].
    pub excluded: Vec<AudioAsset>,
}

impl PairingReport {
    pub fn with_midi(&self) -> usize {
        self.pairs.iter().filter(|p| p.midi.is_some()).count()
    }

    pub fn vocal_indices(&self) -> Vec<usize> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_vocal)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn remove_pair(&mut self, index: usize) -> bool {
        if index < self.pairs.len() {
            self.pairs.remove(index);
            true
        } else {
            false
        }
    }
}

impl fmt::Display for PairingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File pairing report")?;
        for (i, pair) in self.pairs.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, pair.audio.filename())?;
            writeln!(f, "   id: {}", pair.id)?;
            match &pair.midi {
                Some(m) => writeln!(f, "   MIDI: {} (match {:.0}%)", m.filename(), pair.match_score)?,
                None => writeln!(f, "   MIDI: none")?,
            }
            if pair.is_vocal {
                writeln!(f, "   flagged as vocal")?;
            }
        }
        for asset in &self.excluded {
            writeln!(f, "excluded vocal: {}", asset.filename())?;
        }
        write!(
            f,
            "{} pair(s): {} with MIDI, {} without",
            self.pairs.len(),
            self.with_midi(),
            self.pairs.len() - self.with_midi()
        )
    }
}
