use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use hound::WavWriter;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::Serialize;
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::types::AudioBuffer;

/// Every exported stem is written at this rate.
pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;
pub const OUTPUT_BIT_DEPTH: u16 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub frame_count: u64,
    pub duration: f64,
}

fn open_format(path: &Path) -> Result<Box<dyn symphonia::core::formats::FormatReader>> {
    let file: File =
        File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unsupported or corrupt audio file: {:?}", path))?;

    Ok(probed.format)
}

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path: &Path = path.as_ref();

    let mut format = open_format(path)?;
    let track = format.default_track().context("No default track found")?;
    let track_id = track.id;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: usize = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder.decode(&packet)?;
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count();

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend_from_slice(buffer.samples());
    }

    if sample_rate == 0 || channels == 0 {
        anyhow::bail!("Could not determine sample rate/channels of {:?}", path);
    }

    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        samples = samples.len(),
        "read audio"
    );

    Ok(AudioBuffer::from_interleaved(&samples, channels, sample_rate))
}

/// Stream parameters from the container header, without decoding any packets.
pub fn audio_info<P: AsRef<Path>>(path: P) -> Result<AudioInfo> {
    let path: &Path = path.as_ref();
    let format = open_format(path)?;
    let track = format.default_track().context("No default track found")?;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .with_context(|| format!("No sample rate in header of {:?}", path))?;
    let channels = params.channels.map(|c| c.count()).unwrap_or(0);
    let frame_count = params.n_frames.unwrap_or(0);

    Ok(AudioInfo {
        sample_rate,
        channels,
        frame_count,
        duration: frame_count as f64 / sample_rate as f64,
    })
}

/// Resample every channel independently to `to_rate`.
pub fn resample(buffer: &AudioBuffer, to_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate == to_rate || buffer.frames() == 0 {
        return Ok(AudioBuffer::new(buffer.samples.clone(), to_rate));
    }
    if buffer.sample_rate == 0 || to_rate == 0 {
        anyhow::bail!("Cannot resample from {} Hz to {} Hz", buffer.sample_rate, to_rate);
    }

    let num_frames = buffer.frames();
    let channels = buffer.channels();

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / buffer.sample_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, channels)
        .context("Failed to create resampler")?;

    let input: Vec<Vec<f32>> = buffer.samples.rows().into_iter().map(|r| r.to_vec()).collect();
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    debug!(
        from = buffer.sample_rate,
        to = to_rate,
        frames_in = num_frames,
        frames_out = output.first().map_or(0, Vec::len),
        "resampled"
    );

    Ok(AudioBuffer::from_channels(output, to_rate))
}

/// Write a 44.1 kHz / 16-bit PCM WAV.
///
/// The buffer is resampled first if needed and peak-normalized, so a hot
/// source never clips on the way out.
pub fn write_audio<P: AsRef<Path>>(path: P, audio: &AudioBuffer) -> Result<()> {
    let path = path.as_ref();
    let audio = resample(audio, OUTPUT_SAMPLE_RATE)?;

    let peak = audio.peak();
    let gain = if peak > 0.0 { 1.0 / (peak + 1e-8) } else { 1.0 };

    let spec = hound::WavSpec {
        channels: audio.channels() as u16,
        sample_rate: OUTPUT_SAMPLE_RATE,
        bits_per_sample: OUTPUT_BIT_DEPTH,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    for sample in audio.to_interleaved() {
        let s = (sample * gain * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }

    writer.finalize()?;
    debug!(path = %path.display(), channels = audio.channels(), frames = audio.frames(), "wrote audio");
    Ok(())
}
