use std::{path::PathBuf, process};

use chrono::Local;
use clap::{Parser, Subcommand};
use stem_refinery_core::{
    config::RefineryConfig,
    pipeline::{labels_template, load_labels, save_labels, StemOutcome},
    set_export_progress_callback, BatchProcessor, ExportProgress, ScanningUidSequence,
    SliceRequest, StemClassification, StemValidator, TimeSignature, Track, TrackInfo,
    UidSequence, VocalRights,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stem-refinery")]
#[command(about = "Pair, slice and label audio/MIDI stems into a training dataset", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a folder and print the audio/MIDI pairing report
    Scan {
        source: PathBuf,

        /// Write a blank labels file for the pairs found
        #[arg(long)]
        labels_template: Option<PathBuf>,
    },

    /// Print the next free UID under the output root
    NextUid {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan, pair, slice, validate and export one track
    Process {
        source: PathBuf,

        #[arg(short, long)]
        labels: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        title: String,

        /// Use this UID instead of the next free one
        #[arg(long)]
        uid: Option<String>,

        #[arg(short, long, default_value = "other")]
        genre: String,

        #[arg(long, default_value = "")]
        genre_sub: String,

        /// Detected from MIDI or audio when omitted
        #[arg(short, long)]
        bpm: Option<f64>,

        #[arg(short, long, default_value = "Cmin")]
        key: String,

        #[arg(long, default_value_t = 4)]
        beats_per_bar: u8,

        #[arg(short, long, default_value_t = 3)]
        energy: u8,

        #[arg(short, long, num_args = 1..)]
        mood: Vec<String>,

        #[arg(long)]
        royalty_free: bool,

        #[arg(long)]
        contains_ai: bool,

        #[arg(long)]
        start_bars: Option<f64>,

        #[arg(long)]
        end_bars: Option<f64>,

        /// Master/mixdown files to copy into Masters/
        #[arg(long)]
        master: Vec<PathBuf>,
    },

    /// Check a single group/instrument/layer label
    Validate {
        group: String,
        instrument: String,
        layer: String,

        #[arg(long)]
        has_midi: bool,

        #[arg(long)]
        mono: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config).and_then(|config| match cli.command {
        Commands::Scan {
            source,
            labels_template,
        } => handle_scan(config, source, labels_template),
        Commands::NextUid { output } => handle_next_uid(config, output),
        Commands::Process {
            source,
            labels,
            output,
            title,
            uid,
            genre,
            genre_sub,
            bpm,
            key,
            beats_per_bar,
            energy,
            mood,
            royalty_free,
            contains_ai,
            start_bars,
            end_bars,
            master,
        } => {
            let mut config = config;
            if let Some(output) = output {
                config.output_root = output;
            }
            if royalty_free {
                config.vocal_rights = VocalRights::RoyaltyFree;
            }
            let window = (
                start_bars.unwrap_or(config.start_bars),
                end_bars.unwrap_or(config.end_bars),
            );
            let info = TrackInfo {
                uid: uid.unwrap_or_default(),
                title,
                original_folder: source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                genre: genre.clone(),
                genre_parent: genre,
                genre_sub,
                bpm: bpm.unwrap_or(0.0),
                key,
                time_signature: TimeSignature::new(beats_per_bar, 4),
                energy_level: energy,
                moods: mood,
                vocal_rights: config.vocal_rights,
                contains_ai,
            };
            handle_process(config, source, labels, info, window, master)
        }
        Commands::Validate {
            group,
            instrument,
            layer,
            has_midi,
            mono,
        } => handle_validate(config, group, instrument, layer, has_midi, mono),
    });

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn load_config(path: Option<PathBuf>) -> CliResult<RefineryConfig> {
    let config = match path {
        Some(path) => RefineryConfig::load(&path)?,
        None => {
            let mut config = RefineryConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };
    Ok(config)
}

fn handle_scan(
    config: RefineryConfig,
    source: PathBuf,
    labels_out: Option<PathBuf>,
) -> CliResult<()> {
    let processor = BatchProcessor::new(config);
    let report = processor.pair_folder(&source)?;
    println!("{}", report);

    if let Some(path) = labels_out {
        save_labels(&path, &labels_template(&report))?;
        eprintln!("Wrote labels template: {}", path.display());
    }
    Ok(())
}

fn handle_next_uid(config: RefineryConfig, output: Option<PathBuf>) -> CliResult<()> {
    let root = output.unwrap_or(config.output_root);
    let mut seq = ScanningUidSequence::new(root, config.uid_prefix, config.uid_padding);
    println!("{}", seq.next_uid()?);
    Ok(())
}

fn handle_process(
    config: RefineryConfig,
    source: PathBuf,
    labels_path: PathBuf,
    mut info: TrackInfo,
    (start_bars, end_bars): (f64, f64),
    masters: Vec<PathBuf>,
) -> CliResult<()> {
    let processor = BatchProcessor::new(config);
    let cfg = processor.config();

    let report = processor.pair_folder(&source)?;
    let labels = load_labels(&labels_path)?;

    if info.uid.is_empty() {
        let mut seq =
            ScanningUidSequence::new(&cfg.output_root, cfg.uid_prefix.clone(), cfg.uid_padding);
        info.uid = seq.next_uid()?;
    }
    if info.bpm <= 0.0 {
        info.bpm = processor.detect_track_bpm(&report);
    }

    let (mut track, skipped) = Track::from_labels(info, &report, &labels);
    track.masters = masters;
    for s in &skipped {
        eprintln!("Skipped: {}", s.stem());
    }

    set_export_progress_callback(|p| match p {
        ExportProgress::Stage(stage) => eprintln!("{}", stage),
        ExportProgress::Stem { done, total, name } => {
            eprintln!("[{}/{}] {}", done, total, name)
        }
        ExportProgress::Finished => {}
    });

    let request = SliceRequest::bars(start_bars, end_bars);
    let result = processor.process_track(&track, &request, Local::now().date_naive())?;

    for outcome in &result.outcomes {
        match outcome {
            StemOutcome::Exported {
                stem,
                audio_path,
                warnings,
                ..
            } => {
                println!("ok      {} -> {}", stem, audio_path.display());
                for w in warnings {
                    println!("        warning: {}", w);
                }
            }
            StemOutcome::Failed { stem, reason } => println!("failed  {}: {}", stem, reason),
            StemOutcome::Skipped { stem, reason } => println!("skipped {}: {}", stem, reason),
        }
    }
    for issue in &result.metadata_issues {
        println!("metadata: {}", issue);
    }
    println!(
        "{}: {} exported, {} failed -> {}",
        result.uid,
        result.exported(),
        result.failed(),
        result.track_dir.display()
    );
    Ok(())
}

fn handle_validate(
    config: RefineryConfig,
    group: String,
    instrument: String,
    layer: String,
    has_midi: bool,
    mono: bool,
) -> CliResult<()> {
    let validator = StemValidator::new(config.taxonomy);
    let class = StemClassification::new(&group, &instrument, &layer);
    let warnings = validator.validate_classification(&class, has_midi, mono);

    println!("{}/{}/{}", class.group, class.instrument, class.layer);
    println!("  force mono:   {}", validator.should_force_mono(&class.group, &class.instrument));
    println!("  keep stereo:  {}", validator.should_keep_stereo(&class.group, &class.instrument));
    println!("  requires MIDI: {}", validator.requires_midi(&class.group));
    if warnings.is_empty() {
        println!("  no warnings");
    }
    for w in warnings {
        println!("  warning: {}", w);
    }
    Ok(())
}
