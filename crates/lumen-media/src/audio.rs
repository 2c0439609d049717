//! WAV assembly and short-time energy analysis.
//!
//! The synthesizer concatenates per-segment waveforms with literal zero
//! samples for pauses and writes 16-bit PCM at the TTS model's native rate.
//! The governor derives its audio gate from short-time RMS energy computed
//! here; no resampling happens anywhere in this module.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Mask value assigned to frames below the speech-energy threshold.
pub const PAUSE_MASK_VALUE: f32 = 0.05;

/// Floor for the adaptive silence threshold.
const MIN_RMS_THRESHOLD: f32 = 1e-4;

/// Read a WAV file as mono f32 samples in [-1, 1] plus its sample rate.
///
/// Multi-channel input is averaged down to mono.
pub fn read_wav_mono(path: impl AsRef<Path>) -> MediaResult<(Vec<f32>, u32)> {
    let reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(MediaError::audio_decode("WAV contains no samples"));
    }

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// Write mono f32 samples as 16-bit PCM WAV.
pub fn write_pcm16_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
) -> MediaResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Append `seconds` of literal zero samples. A zero or negative duration
/// appends nothing.
pub fn append_silence(samples: &mut Vec<f32>, seconds: f64, sample_rate: u32) {
    if seconds <= 0.0 {
        return;
    }
    let count = (seconds * sample_rate as f64).round() as usize;
    samples.extend(std::iter::repeat(0.0).take(count));
}

/// Short-time RMS energy with the given hop length. One value per hop,
/// covering the full signal (the final partial hop included).
pub fn rms_energy(samples: &[f32], hop: usize) -> Vec<f32> {
    if samples.is_empty() || hop == 0 {
        return Vec::new();
    }
    samples
        .chunks(hop)
        .map(|chunk| {
            let energy: f32 = chunk.iter().map(|s| s * s).sum();
            (energy / chunk.len() as f32).sqrt()
        })
        .collect()
}

/// Percentile of a value set via linear interpolation between ranks.
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = (rank - lower as f64) as f32;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Build the frame-level audio gate from a waveform.
///
/// Hop length is `sample_rate / fps` so one RMS value lands per video
/// frame; the series is then linearly resampled to exactly `num_frames`.
/// Frames below `max(1e-4, 1.5 * P20(rms))` carry [`PAUSE_MASK_VALUE`],
/// frames at or above carry `1.0`.
pub fn build_audio_mask(
    samples: &[f32],
    sample_rate: u32,
    fps: u32,
    num_frames: usize,
) -> Vec<f32> {
    if num_frames == 0 {
        return Vec::new();
    }
    let hop = (sample_rate / fps.max(1)).max(1) as usize;
    let rms = rms_energy(samples, hop);
    if rms.is_empty() {
        return vec![1.0; num_frames];
    }

    let threshold = (1.5 * percentile(&rms, 20.0)).max(MIN_RMS_THRESHOLD);
    let mask: Vec<f32> = rms
        .iter()
        .map(|&e| if e >= threshold { 1.0 } else { PAUSE_MASK_VALUE })
        .collect();

    let resampled = resample_linear(&mask, num_frames);
    let pause_count = resampled.iter().filter(|&&m| m < 0.1).count();
    debug!(
        threshold = threshold,
        pause_frames = pause_count,
        total_frames = num_frames,
        "Built audio intent mask"
    );
    resampled
}

/// Linear interpolation resampling onto `target_len` points.
pub fn resample_linear(values: &[f32], target_len: usize) -> Vec<f32> {
    if target_len == 0 || values.is_empty() {
        return Vec::new();
    }
    if values.len() == target_len {
        return values.to_vec();
    }
    if values.len() == 1 {
        return vec![values[0]; target_len];
    }

    let mut out = Vec::with_capacity(target_len);
    let scale = (values.len() - 1) as f64 / (target_len - 1).max(1) as f64;
    for i in 0..target_len {
        let pos = i as f64 * scale;
        let lower = pos.floor() as usize;
        let upper = (lower + 1).min(values.len() - 1);
        let weight = (pos - lower as f64) as f32;
        out.push(values[lower] * (1.0 - weight) + values[upper] * weight);
    }
    out
}

/// Duration in seconds of a sample buffer.
pub fn duration_seconds(samples: &[f32], sample_rate: u32) -> f64 {
    samples.len() as f64 / sample_rate.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, seconds: f64, rate: u32, amplitude: f32) -> Vec<f32> {
        let n = (seconds * rate as f64) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_append_silence_zero_adds_nothing() {
        let mut samples = vec![0.5; 10];
        append_silence(&mut samples, 0.0, 24000);
        assert_eq!(samples.len(), 10);
    }

    #[test]
    fn test_append_silence_sample_count() {
        let mut samples = Vec::new();
        append_silence(&mut samples, 0.3, 24000);
        assert_eq!(samples.len(), 7200);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_rms_energy_of_silence_is_zero() {
        let rms = rms_energy(&vec![0.0; 4800], 960);
        assert_eq!(rms.len(), 5);
        assert!(rms.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_rms_energy_of_tone() {
        // RMS of a full-scale sine is 1/sqrt(2).
        let tone = sine(440.0, 1.0, 24000, 1.0);
        let rms = rms_energy(&tone, 960);
        for e in rms {
            assert!((e - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
        }
    }

    #[test]
    fn test_percentile() {
        let values: Vec<f32> = (1..=100).map(|v| v as f32).collect();
        assert!((percentile(&values, 20.0) - 20.8).abs() < 0.01);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 100.0);
    }

    #[test]
    fn test_audio_mask_separates_speech_and_silence() {
        let rate = 24000;
        let mut samples = sine(220.0, 1.0, rate, 0.8);
        append_silence(&mut samples, 1.0, rate);
        samples.extend(sine(220.0, 1.0, rate, 0.8));

        let mask = build_audio_mask(&samples, rate, 25, 75);
        assert_eq!(mask.len(), 75);
        // Middle second should be gated down to the pause value.
        assert!(mask[30] < 0.1);
        // Spoken spans stay at full authority.
        assert!(mask[10] > 0.9);
        assert!(mask[65] > 0.9);
    }

    #[test]
    fn test_resample_linear_endpoints() {
        let values = vec![0.0, 1.0];
        let out = resample_linear(&values, 5);
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[4], 1.0);
        assert!((out[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples = sine(440.0, 0.25, 24000, 0.5);

        write_pcm16_wav(&path, &samples, 24000).unwrap();
        let (back, rate) = read_wav_mono(&path).unwrap();

        assert_eq!(rate, 24000);
        assert_eq!(back.len(), samples.len());
        // 16-bit quantization error stays small.
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
